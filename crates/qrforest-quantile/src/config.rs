//! Configuration for fitting a quantile forest and for importance runs.

use qrforest_trees::{ForestConfig, MaxFeatures, RandomForestRegressor};
use tracing::{info, instrument};

use crate::error::QuantileError;
use crate::forest::QuantileForest;
use crate::optim::OptimConfig;
use crate::solver::Strategy;
use crate::training::TrainingSet;

/// Per-tree leaf limit used when growing the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum LeafLimit {
    /// `max(10, n_samples / 100)` leaves.
    #[default]
    Auto,
    /// A fixed leaf count (at least 2).
    Fixed(usize),
    /// Grow until no split reduces impurity.
    Unlimited,
}

impl LeafLimit {
    /// Concrete `max_leaf_nodes` for a training set of `n_samples`.
    #[must_use]
    pub fn resolve(self, n_samples: usize) -> Option<usize> {
        match self {
            LeafLimit::Auto => Some((n_samples / 100).max(10)),
            LeafLimit::Fixed(n) => Some(n),
            LeafLimit::Unlimited => None,
        }
    }
}

/// Settings the fitted model keeps for answering queries.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct QuantileSettings {
    pub(crate) cdf_points: usize,
    pub(crate) optim: OptimConfig,
}

impl QuantileSettings {
    /// Settings with the given grid size and optimizer limits.
    #[must_use]
    pub fn new(cdf_points: usize, optim: OptimConfig) -> Self {
        Self { cdf_points, optim }
    }

    /// CDF grid size; 0 means the sorted training outputs.
    #[must_use]
    pub fn cdf_points(&self) -> usize {
        self.cdf_points
    }

    /// Optimizer limits for the optimization strategy.
    #[must_use]
    pub fn optim(&self) -> &OptimConfig {
        &self.optim
    }
}

/// Configuration for fitting a [`QuantileForest`] on a bootstrap forest.
///
/// # Defaults
///
/// | Parameter            | Default  |
/// |----------------------|----------|
/// | `n_trees`            | 50       |
/// | `leaf_limit`         | `Auto`   |
/// | `max_features`       | `All`    |
/// | `bootstrap_fraction` | 1.0      |
/// | `seed`               | 42       |
/// | `cdf_points`         | 0        |
/// | `optim`              | [`OptimConfig::default`] |
#[derive(Debug, Clone, Default)]
pub struct QuantileForestConfig {
    forest: ForestConfig,
    leaf_limit: LeafLimit,
    settings: QuantileSettings,
}

impl QuantileForestConfig {
    /// Create a config with `n_trees` trees.
    ///
    /// # Errors
    ///
    /// Returns [`QuantileError::Forest`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, QuantileError> {
        Ok(Self {
            forest: ForestConfig::new(n_trees)?,
            ..Self::default()
        })
    }

    /// Set the per-tree leaf limit.
    #[must_use]
    pub fn with_leaf_limit(mut self, leaf_limit: LeafLimit) -> Self {
        self.leaf_limit = leaf_limit;
        self
    }

    /// Set the split feature subsampling.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.forest = self.forest.with_max_features(max_features);
        self
    }

    /// Set the minimum number of samples per leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.forest = self.forest.with_min_samples_leaf(min_samples_leaf);
        self
    }

    /// Set the bootstrap fraction.
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, bootstrap_fraction: f64) -> Self {
        self.forest = self.forest.with_bootstrap_fraction(bootstrap_fraction);
        self
    }

    /// Set the forest seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.forest = self.forest.with_seed(seed);
        self
    }

    /// Set the CDF grid size (0 = sorted training outputs).
    #[must_use]
    pub fn with_cdf_points(mut self, cdf_points: usize) -> Self {
        self.settings.cdf_points = cdf_points;
        self
    }

    /// Set the optimizer limits.
    #[must_use]
    pub fn with_optim(mut self, optim: OptimConfig) -> Self {
        self.settings.optim = optim;
        self
    }

    /// Return the underlying forest config.
    #[must_use]
    pub fn forest_config(&self) -> &ForestConfig {
        &self.forest
    }

    /// Return the leaf limit.
    #[must_use]
    pub fn leaf_limit(&self) -> LeafLimit {
        self.leaf_limit
    }

    /// Return the query settings the fitted model will carry.
    #[must_use]
    pub fn settings(&self) -> &QuantileSettings {
        &self.settings
    }

    /// Grow a bootstrap forest and index the training set.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::InvalidOptimConfig`] | optimizer limits unusable |
    /// | [`QuantileError::TrainingSetMismatch`] | empty, ragged, or non-finite training data |
    /// | [`QuantileError::Forest`] | forest training failed |
    #[instrument(skip_all, fields(n_samples = inputs.len(), n_trees = self.forest.n_trees()))]
    pub fn fit(
        &self,
        inputs: &[Vec<f64>],
        outputs: &[f64],
    ) -> Result<QuantileForest<RandomForestRegressor>, QuantileError> {
        self.settings.optim.validate()?;
        let training = TrainingSet::new(inputs.to_vec(), outputs.to_vec())?;

        let max_leaf_nodes = self.leaf_limit.resolve(training.n_samples());
        info!(?max_leaf_nodes, "fitting quantile forest");
        let forest = self
            .forest
            .clone()
            .with_max_leaf_nodes(max_leaf_nodes)
            .fit(training.inputs(), training.outputs())?;

        QuantileForest::from_training_set(forest, training, self.settings)
    }
}

/// Configuration for permutation importance.
///
/// # Defaults
///
/// | Parameter         | Default     |
/// |-------------------|-------------|
/// | `strategy`        | `Inversion` |
/// | `seed`            | 42          |
/// | `n_jobs`          | `None` (all cores) |
/// | `restrict_to_oob` | false       |
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImportanceConfig {
    strategy: Strategy,
    seed: u64,
    n_jobs: Option<usize>,
    restrict_to_oob: bool,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Inversion,
            seed: 42,
            n_jobs: None,
            restrict_to_oob: false,
        }
    }
}

impl ImportanceConfig {
    /// Create a config with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how single-tree quantiles are resolved.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the permutation seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the worker count; `None` uses every core.
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Weight each tree over its out-of-bag samples only.
    #[must_use]
    pub fn with_restrict_to_oob(mut self, restrict_to_oob: bool) -> Self {
        self.restrict_to_oob = restrict_to_oob;
        self
    }

    /// Return the resolution strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Return the permutation seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the worker count.
    #[must_use]
    pub fn n_jobs(&self) -> Option<usize> {
        self.n_jobs
    }

    /// Return whether weighting is restricted to out-of-bag samples.
    #[must_use]
    pub fn restrict_to_oob(&self) -> bool {
        self.restrict_to_oob
    }
}
