//! Saving and loading fitted quantile forests via bincode.

use std::path::Path;

use qrforest_trees::RandomForestRegressor;
use tracing::{debug, info, instrument};

use crate::config::QuantileSettings;
use crate::error::QuantileError;
use crate::forest::QuantileForest;
use crate::training::TrainingSet;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized model.
///
/// The leaf assignment matrix is derived data and is rebuilt on load.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    n_trees: usize,
    n_features: usize,
    n_samples: usize,
    settings: QuantileSettings,
    training: TrainingSet,
    forest: RandomForestRegressor,
}

impl QuantileForest<RandomForestRegressor> {
    /// Save the forest, training set and settings to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::SerializeModel`] | bincode encoding failed |
    /// | [`QuantileError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), QuantileError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            n_trees: self.n_trees(),
            n_features: self.n_features(),
            n_samples: self.n_samples(),
            settings: *self.settings(),
            training: self.training().clone(),
            forest: self.forest().clone(),
        };

        let bytes = bincode::serialize(&envelope)
            .map_err(|source| QuantileError::SerializeModel { source })?;

        std::fs::write(path, &bytes).map_err(|source| QuantileError::WriteModel {
            path: path.to_path_buf(),
            source,
        })?;

        info!(size_bytes = bytes.len(), n_trees = self.n_trees(), "model saved");
        Ok(())
    }

    /// Load a model written by [`QuantileForest::save`] and rebuild its index.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::ReadModel`] | file read failed |
    /// | [`QuantileError::DeserializeModel`] | bincode decoding failed |
    /// | [`QuantileError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`QuantileError::TrainingSetMismatch`] | stored training set does not fit the stored forest |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuantileError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|source| QuantileError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;

        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|source| QuantileError::DeserializeModel {
                path: path.to_path_buf(),
                source,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(QuantileError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            n_trees = envelope.n_trees,
            n_features = envelope.n_features,
            n_samples = envelope.n_samples,
            "model loaded"
        );

        QuantileForest::from_training_set(envelope.forest, envelope.training, envelope.settings)
    }
}
