//! Configuration builder for regression forest training.

use crate::error::TreeError;
use crate::forest::RandomForestRegressor;

/// How many input columns each split may choose from.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// `ceil(sqrt(d))`.
    Sqrt,
    /// `ceil(log2(d))`, at least 1.
    Log2,
    /// `ceil(f * d)` for `f` in `(0, 1]`.
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// Every column at every split.
    All,
}

/// Configuration for bootstrap regression forest training.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
/// Every tree is grown on a bootstrap draw; the samples left out of a
/// tree's draw are its out-of-bag set.
///
/// # Defaults
///
/// | Parameter            | Default     |
/// |----------------------|-------------|
/// | `n_trees`            | 50          |
/// | `max_features`       | `All`       |
/// | `max_depth`          | `None`      |
/// | `max_leaf_nodes`     | `None`      |
/// | `min_samples_split`  | 2           |
/// | `min_samples_leaf`   | 1           |
/// | `seed`               | 42          |
/// | `bootstrap_fraction` | 1.0         |
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_leaf_nodes: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) seed: u64,
    pub(crate) bootstrap_fraction: f64,
}

impl ForestConfig {
    /// Defaults with `n_trees` trees.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, TreeError> {
        if n_trees == 0 {
            return Err(TreeError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            ..Self::default()
        })
    }

    /// Candidate columns per split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Depth cap; `None` grows until another limit stops it.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Leaf cap per tree, reached best-first; `None` for no cap.
    #[must_use]
    pub fn with_max_leaf_nodes(mut self, max_leaf_nodes: Option<usize>) -> Self {
        self.max_leaf_nodes = max_leaf_nodes;
        self
    }

    /// Nodes with fewer in-bag samples stay leaves.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Splits leaving fewer samples on either side are rejected.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Master seed; per-tree seeds are drawn from it.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Draws per tree as a share of the training rows.
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, bootstrap_fraction: f64) -> Self {
        self.bootstrap_fraction = bootstrap_fraction;
        self
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    #[must_use]
    pub fn max_leaf_nodes(&self) -> Option<usize> {
        self.max_leaf_nodes
    }

    #[must_use]
    pub fn min_samples_split(&self) -> usize {
        self.min_samples_split
    }

    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.min_samples_leaf
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn bootstrap_fraction(&self) -> f64 {
        self.bootstrap_fraction
    }

    /// Train a bootstrap regression forest.
    ///
    /// `features[sample_idx][feature_idx]` (row-major), `targets[sample_idx]`.
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                                             |
    /// |-----------------------------------------|--------------------------------------------------|
    /// | [`TreeError::EmptyDataset`]             | `features` is empty                              |
    /// | [`TreeError::ZeroFeatures`]             | rows have zero feature columns                   |
    /// | [`TreeError::FeatureCountMismatch`]     | rows have inconsistent lengths                   |
    /// | [`TreeError::TargetCountMismatch`]      | `targets.len() != features.len()`                |
    /// | [`TreeError::NonFiniteValue`]           | any feature is NaN or infinite                   |
    /// | [`TreeError::NonFiniteTarget`]          | any target is NaN or infinite                    |
    /// | [`TreeError::InvalidMaxFeatures`]       | resolved max_features is outside [1, n_features] |
    /// | [`TreeError::InvalidBootstrapFraction`] | bootstrap_fraction is not in (0.0, 1.0]          |
    /// | [`TreeError::InvalidMaxLeafNodes`]      | max_leaf_nodes is below 2                        |
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
    ) -> Result<RandomForestRegressor, TreeError> {
        crate::forest::train(self, features, targets)
    }
}

impl Default for ForestConfig {
    /// Fifty trees with the defaults listed above.
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_features: MaxFeatures::All,
            max_depth: None,
            max_leaf_nodes: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
            bootstrap_fraction: 1.0,
        }
    }
}
