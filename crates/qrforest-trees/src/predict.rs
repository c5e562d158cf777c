//! Leaf lookup, out-of-bag access, and mean prediction for the forest.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::TreeError;
use crate::forest::RandomForestRegressor;
use crate::node::NodeIndex;
use crate::tree::RegressionTree;

impl RandomForestRegressor {
    /// Return the leaf each tree assigns to `sample`, in tree order.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn apply(&self, sample: &[f64]) -> Result<Vec<NodeIndex>, TreeError> {
        self.trees.iter().map(|tree| tree.apply(sample)).collect()
    }

    /// Return the leaf-id matrix `[sample][tree]` for a batch, in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn apply_batch(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<NodeIndex>>, TreeError> {
        features
            .into_par_iter()
            .map(|sample| self.apply(sample))
            .collect()
    }

    /// Return the leaf a single tree assigns to `sample`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::TreeIndexOutOfRange`] | `tree >= n_trees` |
    /// | [`TreeError::PredictionFeatureMismatch`] | `sample.len() != n_features` |
    pub fn apply_tree(&self, tree: usize, sample: &[f64]) -> Result<NodeIndex, TreeError> {
        self.tree(tree)?.apply(sample)
    }

    /// Predict the mean of the tree predictions for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, TreeError> {
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.predict(sample)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    /// Predict mean responses for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, TreeError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return the training-sample indices left out of `tree`'s bootstrap draw.
    ///
    /// Indices are sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TreeIndexOutOfRange`] when `tree >= n_trees`.
    pub fn oob_indices(&self, tree: usize) -> Result<&[usize], TreeError> {
        self.oob_indices
            .get(tree)
            .map(Vec::as_slice)
            .ok_or(TreeError::TreeIndexOutOfRange {
                tree,
                n_trees: self.trees.len(),
            })
    }

    /// Borrow one tree of the ensemble.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TreeIndexOutOfRange`] when `tree >= n_trees`.
    pub fn tree(&self, tree: usize) -> Result<&RegressionTree, TreeError> {
        self.trees.get(tree).ok_or(TreeError::TreeIndexOutOfRange {
            tree,
            n_trees: self.trees.len(),
        })
    }

    /// Borrow all trees.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of training samples the bootstrap draws were taken from.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
