/// Errors from growing regression trees and forests, and from leaf lookups.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A forest needs at least one tree.
    #[error("forest needs at least one tree, got n_trees = {n_trees}")]
    InvalidTreeCount {
        /// Requested tree count.
        n_trees: usize,
    },

    /// Depth caps start at 1.
    #[error("max_depth = {max_depth} is not a usable depth cap (minimum 1)")]
    InvalidMaxDepth {
        /// Requested depth cap.
        max_depth: usize,
    },

    /// A leaf cap below 2 would forbid the first split.
    #[error("max_leaf_nodes = {max_leaf_nodes} leaves no room for a split (minimum 2)")]
    InvalidMaxLeafNodes {
        /// Requested leaf cap.
        max_leaf_nodes: usize,
    },

    /// Splitting needs at least two samples in the node.
    #[error("min_samples_split = {min_samples_split} is below 2")]
    InvalidMinSamplesSplit {
        /// Requested minimum.
        min_samples_split: usize,
    },

    /// Leaves must hold at least one sample.
    #[error("min_samples_leaf = {min_samples_leaf} is below 1")]
    InvalidMinSamplesLeaf {
        /// Requested minimum.
        min_samples_leaf: usize,
    },

    /// The candidate-feature count per split resolved outside `[1, n_features]`.
    #[error("{max_features} candidate features per split, but the data has {n_features}")]
    InvalidMaxFeatures {
        /// Resolved candidate count.
        max_features: usize,
        /// Input width of the training data.
        n_features: usize,
    },

    /// Bootstrap draws are sized as a fraction in `(0, 1]` of the training set.
    #[error("bootstrap fraction {fraction} outside (0, 1]")]
    InvalidBootstrapFraction {
        /// Requested fraction.
        fraction: f64,
    },

    /// No training rows.
    #[error("cannot grow a forest on zero rows")]
    EmptyDataset,

    /// Training rows carry no input columns.
    #[error("training rows have no input columns")]
    ZeroFeatures,

    /// A training row is narrower or wider than the first row.
    #[error("row {sample_index} has width {got}, first row has {expected}")]
    FeatureCountMismatch {
        /// Width of the first row.
        expected: usize,
        /// Width of the offending row.
        got: usize,
        /// Offending row.
        sample_index: usize,
    },

    /// Inputs and targets disagree in length.
    #[error("{n_targets} targets for {n_samples} input rows")]
    TargetCountMismatch {
        /// Input row count.
        n_samples: usize,
        /// Target count.
        n_targets: usize,
    },

    /// A training input is NaN or infinite.
    #[error("input ({sample_index}, {feature_index}) is not finite")]
    NonFiniteValue {
        /// Offending row.
        sample_index: usize,
        /// Offending column.
        feature_index: usize,
    },

    /// A training target is NaN or infinite.
    #[error("target {sample_index} is not finite")]
    NonFiniteTarget {
        /// Offending row.
        sample_index: usize,
    },

    /// A lookup sample does not match the training width.
    #[error("sample width {got} does not match the fitted width {expected}")]
    PredictionFeatureMismatch {
        /// Fitted input width.
        expected: usize,
        /// Width of the sample.
        got: usize,
    },

    /// A tree index past the end of the ensemble.
    #[error("tree {tree} requested from a forest of {n_trees}")]
    TreeIndexOutOfRange {
        /// Requested tree.
        tree: usize,
        /// Trees in the forest.
        n_trees: usize,
    },
}
