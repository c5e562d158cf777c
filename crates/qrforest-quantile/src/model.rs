//! The narrow forest capability the quantile estimator depends on.

use qrforest_trees::RandomForestRegressor;

use crate::error::QuantileError;

/// A trained tree ensemble seen as a leaf oracle.
///
/// Leaf identifiers are opaque and tree-local: two samples share a leaf in
/// tree `t` exactly when `tree_leaf(t, ..)` returns the same value for both.
/// Out-of-bag sets are only meaningful for forests grown on bootstrap draws.
pub trait ForestModel: Send + Sync {
    /// Number of trees in the ensemble.
    fn n_trees(&self) -> usize;

    /// Input dimensionality the ensemble was trained on.
    fn n_features(&self) -> usize;

    /// Leaf that tree `tree` assigns to `sample`.
    ///
    /// # Errors
    ///
    /// Implementations return [`QuantileError::InvalidTreeIndex`] for an
    /// out-of-range tree and [`QuantileError::DimensionMismatch`] (or a
    /// wrapped [`QuantileError::Forest`]) for a sample of the wrong width.
    fn tree_leaf(&self, tree: usize, sample: &[f64]) -> Result<usize, QuantileError>;

    /// Leaf assigned to `sample` by every tree, in tree order.
    ///
    /// # Errors
    ///
    /// Propagates any [`ForestModel::tree_leaf`] failure.
    fn leaf_ids(&self, sample: &[f64]) -> Result<Vec<usize>, QuantileError> {
        (0..self.n_trees())
            .map(|tree| self.tree_leaf(tree, sample))
            .collect()
    }

    /// Sorted training-sample indices left out of tree `tree`'s bootstrap draw.
    ///
    /// # Errors
    ///
    /// Returns [`QuantileError::InvalidTreeIndex`] for an out-of-range tree.
    fn oob_indices(&self, tree: usize) -> Result<&[usize], QuantileError>;
}

impl ForestModel for RandomForestRegressor {
    fn n_trees(&self) -> usize {
        RandomForestRegressor::n_trees(self)
    }

    fn n_features(&self) -> usize {
        RandomForestRegressor::n_features(self)
    }

    fn tree_leaf(&self, tree: usize, sample: &[f64]) -> Result<usize, QuantileError> {
        check_tree(self, tree)?;
        Ok(self.apply_tree(tree, sample)?.index())
    }

    fn leaf_ids(&self, sample: &[f64]) -> Result<Vec<usize>, QuantileError> {
        Ok(self.apply(sample)?.into_iter().map(|leaf| leaf.index()).collect())
    }

    fn oob_indices(&self, tree: usize) -> Result<&[usize], QuantileError> {
        check_tree(self, tree)?;
        Ok(RandomForestRegressor::oob_indices(self, tree)?)
    }
}

fn check_tree(forest: &RandomForestRegressor, tree: usize) -> Result<(), QuantileError> {
    if tree >= forest.n_trees() {
        return Err(QuantileError::InvalidTreeIndex {
            tree,
            n_trees: forest.n_trees(),
        });
    }
    Ok(())
}
