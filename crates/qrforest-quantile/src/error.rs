use std::path::PathBuf;

use qrforest_trees::TreeError;

/// Errors from quantile estimation, importance computation, and persistence.
#[derive(Debug, thiserror::Error)]
pub enum QuantileError {
    /// Returned when query inputs cannot be read as samples of the fitted width.
    #[error("query dimension {got} does not match the fitted dimension {expected}")]
    DimensionMismatch {
        /// Number of input dimensions the model was fitted on.
        expected: usize,
        /// Width of the offending query.
        got: usize,
    },

    /// Returned when a probability level is outside the open interval (0, 1).
    #[error("alpha must lie in (0, 1), got {alpha}")]
    InvalidAlpha {
        /// The rejected probability level.
        alpha: f64,
    },

    /// Returned when a query carries no samples.
    #[error("query contains no samples")]
    EmptyQuery,

    /// Returned when no probability levels are requested.
    #[error("at least one alpha level is required")]
    EmptyAlphaLevels,

    /// Returned when a tree index is outside the forest.
    #[error("tree index {tree} out of range for a forest of {n_trees} trees")]
    InvalidTreeIndex {
        /// The requested tree.
        tree: usize,
        /// Number of trees in the forest.
        n_trees: usize,
    },

    /// Returned when optimizer settings are unusable.
    #[error("invalid optimizer setting {parameter} = {value}")]
    InvalidOptimConfig {
        /// Name of the offending setting.
        parameter: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Returned when the training set handed to the model does not fit the forest.
    #[error("training set mismatch: {reason}")]
    TrainingSetMismatch {
        /// Human-readable description of the mismatch.
        reason: String,
    },

    /// Returned when a strategy or optimizer name is not recognised.
    #[error("unsupported quantile strategy \"{name}\" (expected cobyla, sqp, or inversion)")]
    UnsupportedStrategy {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a query lands in a leaf with no members in the weighted subset.
    #[error("leaf {leaf} of tree {tree} has no training members in the weighted subset")]
    EmptyLeaf {
        /// Tree whose leaf is empty.
        tree: usize,
        /// Tree-local leaf identifier.
        leaf: usize,
    },

    /// Returned when the constrained optimizer does not reach a feasible optimum.
    #[error(
        "{method} did not converge after {iterations} iterations (constraint violation {violation:e})"
    )]
    NonConvergence {
        /// Optimizer name.
        method: &'static str,
        /// Iterations performed.
        iterations: usize,
        /// Constraint violation at the last iterate.
        violation: f64,
    },

    /// Returned when no tree has an out-of-bag sample to evaluate.
    #[error("no tree has any out-of-bag sample")]
    NoOutOfBagSamples,

    /// Returned when the worker pool cannot be created.
    #[error("failed to build worker pool")]
    ThreadPool {
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    /// Wraps a forest training or lookup error.
    #[error("forest error: {0}")]
    Forest(#[from] TreeError),

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}
