//! The fitted quantile regression forest.

use std::sync::OnceLock;

use tracing::{debug, info, instrument};

use crate::cdf::{CdfGrid, WeightedCdf};
use crate::config::{ImportanceConfig, QuantileSettings};
use crate::error::QuantileError;
use crate::executor::{RayonExecutor, TaskExecutor};
use crate::importance::{ImportanceVector, permutation_importance};
use crate::model::ForestModel;
use crate::query::{AlphaLevels, QuantileResult, QueryPoints, TreeSelection};
use crate::solver::{self, Strategy};
use crate::training::{LeafAssignmentMatrix, TrainingIndex, TrainingSet};
use crate::weights;

/// A forest plus the indexed training set it weights over.
///
/// Immutable once built apart from [`QuantileForest::set_cdf_precision`].
/// The CDF grid is built on first use and shared across threads.
#[derive(Debug)]
pub struct QuantileForest<F> {
    forest: F,
    index: TrainingIndex,
    settings: QuantileSettings,
    grid: OnceLock<CdfGrid>,
}

impl<F: ForestModel> QuantileForest<F> {
    /// Wrap an already trained forest with its training data.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::TrainingSetMismatch`] | data invalid or inconsistent with the forest |
    /// | [`QuantileError::InvalidOptimConfig`] | optimizer limits unusable |
    /// | any [`ForestModel`] error | leaf lookup on the training inputs failed |
    pub fn from_forest(
        forest: F,
        inputs: Vec<Vec<f64>>,
        outputs: Vec<f64>,
        settings: QuantileSettings,
    ) -> Result<Self, QuantileError> {
        let training = TrainingSet::new(inputs, outputs)?;
        Self::from_training_set(forest, training, settings)
    }

    /// Wrap a trained forest with an already validated training set.
    ///
    /// # Errors
    ///
    /// Same as [`QuantileForest::from_forest`].
    #[instrument(skip_all, fields(n_samples = training.n_samples(), n_trees = forest.n_trees()))]
    pub fn from_training_set(
        forest: F,
        training: TrainingSet,
        settings: QuantileSettings,
    ) -> Result<Self, QuantileError> {
        settings.optim.validate()?;
        let index = TrainingIndex::build(training, &forest)?;
        info!(
            n_samples = index.training().n_samples(),
            n_features = index.training().n_features(),
            n_trees = forest.n_trees(),
            cdf_points = settings.cdf_points,
            "quantile forest ready"
        );
        Ok(Self {
            forest,
            index,
            settings,
            grid: OnceLock::new(),
        })
    }

    /// The underlying forest.
    #[must_use]
    pub fn forest(&self) -> &F {
        &self.forest
    }

    /// The training set the weights range over.
    #[must_use]
    pub fn training(&self) -> &TrainingSet {
        self.index.training()
    }

    /// The per-tree leaf of every training sample.
    #[must_use]
    pub fn leaves(&self) -> &LeafAssignmentMatrix {
        self.index.leaves()
    }

    /// Query settings.
    #[must_use]
    pub fn settings(&self) -> &QuantileSettings {
        &self.settings
    }

    /// Number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    /// Input dimensionality.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.index.training().n_features()
    }

    /// Number of training samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.index.training().n_samples()
    }

    /// The CDF grid, built on first call.
    pub fn cdf_grid(&self) -> &CdfGrid {
        self.grid.get_or_init(|| {
            debug!(cdf_points = self.settings.cdf_points, "building CDF grid");
            CdfGrid::build(self.index.outputs(), self.settings.cdf_points)
        })
    }

    /// Rebuild the CDF grid with `n_points` values (0 = sorted training outputs).
    pub fn set_cdf_precision(&mut self, n_points: usize) {
        self.settings.cdf_points = n_points;
        self.grid = OnceLock::from(CdfGrid::build(self.index.outputs(), n_points));
        info!(n_points, grid_len = self.cdf_grid().len(), "CDF grid rebuilt");
    }

    fn check_selection(&self, selection: TreeSelection) -> Result<(), QuantileError> {
        match selection.tree() {
            Some(tree) if tree >= self.n_trees() => Err(QuantileError::InvalidTreeIndex {
                tree,
                n_trees: self.n_trees(),
            }),
            _ => Ok(()),
        }
    }

    /// Weight vector over the training set for one resolved sample.
    fn sample_weights(
        &self,
        sample: &[f64],
        selection: TreeSelection,
    ) -> Result<Vec<f64>, QuantileError> {
        let leaves = self.index.leaves();
        match selection {
            TreeSelection::Forest => {
                let ids = self.forest.leaf_ids(sample)?;
                weights::forest_weights(&ids, leaves)
            }
            TreeSelection::Tree(tree) => {
                let leaf = self.forest.tree_leaf(tree, sample)?;
                weights::tree_weights(tree, leaf, leaves, None)
            }
            TreeSelection::TreeOutOfBag(tree) => {
                let leaf = self.forest.tree_leaf(tree, sample)?;
                let members = self.forest.oob_indices(tree)?;
                weights::tree_weights(tree, leaf, leaves, Some(members))
            }
        }
    }

    /// Weight vector of every query sample.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::EmptyQuery`] / [`QuantileError::DimensionMismatch`] | query cannot be resolved |
    /// | [`QuantileError::InvalidTreeIndex`] | selected tree outside the forest |
    /// | [`QuantileError::EmptyLeaf`] | a query lands in a leaf with no eligible members |
    pub fn weights(
        &self,
        query: impl Into<QueryPoints>,
        selection: TreeSelection,
    ) -> Result<Vec<Vec<f64>>, QuantileError> {
        self.check_selection(selection)?;
        let rows = query.into().resolve(self.n_features())?;
        rows.iter()
            .map(|row| self.sample_weights(row, selection))
            .collect()
    }

    /// Quantile table `[row][alpha]` for resolved rows and validated levels.
    pub(crate) fn quantile_rows(
        &self,
        rows: &[Vec<f64>],
        alphas: &[f64],
        strategy: Strategy,
        selection: TreeSelection,
    ) -> Result<Vec<Vec<f64>>, QuantileError> {
        let outputs = self.index.outputs();
        rows.iter()
            .map(|row| {
                let weights = self.sample_weights(row, selection)?;
                solver::resolve(
                    outputs,
                    &weights,
                    alphas,
                    strategy,
                    &self.settings.optim,
                    || self.cdf_grid(),
                )
            })
            .collect()
    }

    /// Conditional quantiles of the response at every query and level.
    ///
    /// The result is a scalar for one query and one level, a vector when
    /// exactly one of the two counts is one, and a `[query][level]` matrix
    /// otherwise.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::EmptyQuery`] / [`QuantileError::DimensionMismatch`] | query cannot be resolved |
    /// | [`QuantileError::EmptyAlphaLevels`] / [`QuantileError::InvalidAlpha`] | bad levels |
    /// | [`QuantileError::InvalidTreeIndex`] | selected tree outside the forest |
    /// | [`QuantileError::EmptyLeaf`] | a query lands in a leaf with no eligible members |
    /// | [`QuantileError::NonConvergence`] | the optimizer failed for some query |
    #[instrument(skip_all, fields(strategy = %strategy, selection = ?selection))]
    pub fn compute_quantile(
        &self,
        query: impl Into<QueryPoints>,
        alphas: impl Into<AlphaLevels>,
        strategy: Strategy,
        selection: TreeSelection,
    ) -> Result<QuantileResult, QuantileError> {
        self.check_selection(selection)?;
        let rows = query.into().resolve(self.n_features())?;
        let alphas = alphas.into().resolve()?;
        debug!(n_queries = rows.len(), n_alphas = alphas.len(), "computing quantiles");

        let table = self.quantile_rows(&rows, &alphas, strategy, selection)?;
        Ok(QuantileResult::from_table(table))
    }

    /// Weighted CDF of every query over the cached grid.
    ///
    /// # Errors
    ///
    /// Same query and selection errors as [`QuantileForest::weights`].
    pub fn compute_cdf(
        &self,
        query: impl Into<QueryPoints>,
        selection: TreeSelection,
    ) -> Result<WeightedCdf, QuantileError> {
        let weights = self.weights(query, selection)?;
        let grid = self.cdf_grid();
        let cdf = weights.iter().map(|w| grid.cdf(w)).collect();
        Ok(WeightedCdf::new(grid.values().to_vec(), cdf))
    }

    /// Permutation importance at level `alpha` with default settings.
    ///
    /// # Errors
    ///
    /// See [`QuantileForest::compute_importance_on`].
    pub fn compute_importance(&self, alpha: f64) -> Result<ImportanceVector, QuantileError> {
        self.compute_importance_with(alpha, &ImportanceConfig::default())
    }

    /// Permutation importance on a rayon pool sized by `config.n_jobs()`.
    ///
    /// # Errors
    ///
    /// [`QuantileError::ThreadPool`] if the pool cannot be built, otherwise
    /// see [`QuantileForest::compute_importance_on`].
    pub fn compute_importance_with(
        &self,
        alpha: f64,
        config: &ImportanceConfig,
    ) -> Result<ImportanceVector, QuantileError> {
        let executor = RayonExecutor::new(config.n_jobs())?;
        self.compute_importance_on(alpha, config, &executor)
    }

    /// Permutation importance with per-tree work run by `executor`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::InvalidAlpha`] | `alpha` outside (0, 1) |
    /// | [`QuantileError::NoOutOfBagSamples`] | every tree's out-of-bag set is empty |
    /// | any per-tree error | e.g. [`QuantileError::EmptyLeaf`]; aborts the whole run |
    pub fn compute_importance_on<E: TaskExecutor>(
        &self,
        alpha: f64,
        config: &ImportanceConfig,
        executor: &E,
    ) -> Result<ImportanceVector, QuantileError> {
        permutation_importance(self, alpha, config, executor)
    }
}

#[cfg(test)]
mod tests {
    use qrforest_trees::RandomForestRegressor;

    use super::*;
    use crate::config::{LeafLimit, QuantileForestConfig};
    use crate::optim::OptimMethod;

    fn model() -> QuantileForest<RandomForestRegressor> {
        let inputs: Vec<Vec<f64>> = (0..120).map(|i| vec![i as f64 / 12.0]).collect();
        let outputs: Vec<f64> = inputs
            .iter()
            .enumerate()
            .map(|(i, r)| 2.0 * r[0] + ((i * 37 % 11) as f64 - 5.0) * 0.1)
            .collect();
        QuantileForestConfig::new(20)
            .unwrap()
            .with_leaf_limit(LeafLimit::Fixed(8))
            .with_seed(5)
            .fit(&inputs, &outputs)
            .unwrap()
    }

    #[test]
    fn forest_weights_sum_to_one() {
        let model = model();
        let weights = model
            .weights(vec![0.5, 4.2, 9.9], TreeSelection::Forest)
            .unwrap();
        assert_eq!(weights.len(), 3);
        for w in &weights {
            assert_eq!(w.len(), model.n_samples());
            assert!(w.iter().all(|&v| v >= 0.0));
            assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn single_tree_weights_are_uniform_on_leaf() {
        let model = model();
        let w = &model.weights(3.0, TreeSelection::Tree(2)).unwrap()[0];
        let nonzero: Vec<f64> = w.iter().copied().filter(|&v| v > 0.0).collect();
        assert!(!nonzero.is_empty());
        assert!(nonzero.iter().all(|&v| (v - nonzero[0]).abs() < 1e-15));
        assert!((nonzero.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tree_index_out_of_range_rejected() {
        let model = model();
        let err = model
            .compute_quantile(1.0, 0.5, Strategy::Inversion, TreeSelection::Tree(20))
            .unwrap_err();
        assert!(matches!(err, QuantileError::InvalidTreeIndex { tree: 20, n_trees: 20 }));
    }

    #[test]
    fn result_shapes_follow_counts() {
        let model = model();
        let strategy = Strategy::Inversion;
        let scalar = model
            .compute_quantile(2.0, 0.5, strategy, TreeSelection::Forest)
            .unwrap();
        assert!(scalar.as_scalar().is_some());

        let by_alpha = model
            .compute_quantile(2.0, vec![0.1, 0.5, 0.9], strategy, TreeSelection::Forest)
            .unwrap();
        assert!(matches!(by_alpha, QuantileResult::Vector(ref v) if v.len() == 3));

        let by_query = model
            .compute_quantile(vec![1.0, 2.0], 0.5, strategy, TreeSelection::Forest)
            .unwrap();
        assert!(matches!(by_query, QuantileResult::Vector(ref v) if v.len() == 2));

        let matrix = model
            .compute_quantile(vec![1.0, 2.0], vec![0.1, 0.9], strategy, TreeSelection::Forest)
            .unwrap();
        assert!(matches!(matrix, QuantileResult::Matrix(ref m) if m.len() == 2 && m[0].len() == 2));
    }

    #[test]
    fn set_cdf_precision_rebuilds_grid() {
        let mut model = model();
        assert_eq!(model.cdf_grid().len(), model.n_samples());
        model.set_cdf_precision(25);
        assert_eq!(model.cdf_grid().len(), 25);
        assert_eq!(model.settings().cdf_points(), 25);
        model.set_cdf_precision(0);
        assert_eq!(model.cdf_grid().len(), model.n_samples());
    }

    #[test]
    fn compute_cdf_is_monotone_and_ends_at_one() {
        let model = model();
        let cdf = model.compute_cdf(vec![2.5, 7.0], TreeSelection::Forest).unwrap();
        assert_eq!(cdf.n_queries(), 2);
        for k in 0..2 {
            let values = cdf.query(k).unwrap();
            assert_eq!(values.len(), cdf.grid().len());
            assert!(values.windows(2).all(|w| w[0] <= w[1] + 1e-15));
            assert!((values[values.len() - 1] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn optimizers_match_inversion_on_forest_weights() {
        let model = model();
        let alphas = vec![0.1, 0.25, 0.5, 0.75, 0.9];
        let inversion = model
            .compute_quantile(4.0, alphas.clone(), Strategy::Inversion, TreeSelection::Forest)
            .unwrap()
            .values();
        let grid = model.cdf_grid().values();
        let max_gap = grid.windows(2).map(|w| w[1] - w[0]).fold(0.0, f64::max);
        for method in [OptimMethod::Cobyla, OptimMethod::Sqp] {
            let optimized = model
                .compute_quantile(4.0, alphas.clone(), Strategy::Optimize(method), TreeSelection::Forest)
                .unwrap()
                .values();
            for (a, b) in inversion.iter().zip(&optimized) {
                assert!(
                    (a - b).abs() <= max_gap + 1e-6,
                    "{method}: inversion {a} vs optimized {b}"
                );
            }
        }
    }
}
