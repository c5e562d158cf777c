//! Domain types for qrforest-io.

use crate::IoError;

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input rows without a response column, e.g. query points.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub(crate) fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { feature_names, rows }
    }

    /// Column names from the CSV header.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Row-major values: `rows[sample][feature]`.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Take ownership of the rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}

/// A training dataset: input columns plus one response column.
///
/// Produced by [`DatasetReader`](crate::DatasetReader). `features[i]` and
/// `targets[i]` come from the same CSV row.
#[derive(Debug, Clone)]
pub struct Dataset {
    feature_names: Vec<String>,
    target_name: String,
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl Dataset {
    pub(crate) fn new(
        feature_names: Vec<String>,
        target_name: String,
        features: Vec<Vec<f64>>,
        targets: Vec<f64>,
    ) -> Self {
        Self {
            feature_names,
            target_name,
            features,
            targets,
        }
    }

    /// Input column names, in CSV order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Response column name.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Input matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Response values.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Number of rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.targets.len()
    }

    /// Number of input columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}
