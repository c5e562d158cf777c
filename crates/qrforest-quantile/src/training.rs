//! Training set storage and the per-tree leaf assignment of every training sample.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::error::QuantileError;
use crate::model::ForestModel;

/// Immutable training inputs and outputs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrainingSet {
    inputs: Vec<Vec<f64>>,
    outputs: Vec<f64>,
    n_features: usize,
}

impl TrainingSet {
    /// Validate and wrap a row-major training set.
    ///
    /// # Errors
    ///
    /// Returns [`QuantileError::TrainingSetMismatch`] when the set is empty,
    /// the row and output counts differ, rows have inconsistent widths, or
    /// any value is not finite.
    pub fn new(inputs: Vec<Vec<f64>>, outputs: Vec<f64>) -> Result<Self, QuantileError> {
        let mismatch = |reason: String| QuantileError::TrainingSetMismatch { reason };

        let Some(first) = inputs.first() else {
            return Err(mismatch("training set is empty".to_string()));
        };
        let n_features = first.len();
        if n_features == 0 {
            return Err(mismatch("training inputs have no dimensions".to_string()));
        }
        if inputs.len() != outputs.len() {
            return Err(mismatch(format!(
                "{} input rows but {} outputs",
                inputs.len(),
                outputs.len()
            )));
        }
        for (row, input) in inputs.iter().enumerate() {
            if input.len() != n_features {
                return Err(mismatch(format!(
                    "row {row} has {} values, expected {n_features}",
                    input.len()
                )));
            }
            if input.iter().any(|v| !v.is_finite()) {
                return Err(mismatch(format!("row {row} has a non-finite input")));
            }
        }
        if let Some(row) = outputs.iter().position(|y| !y.is_finite()) {
            return Err(mismatch(format!("output {row} is not finite")));
        }

        Ok(Self {
            inputs,
            outputs,
            n_features,
        })
    }

    /// Row-major training inputs.
    #[must_use]
    pub fn inputs(&self) -> &[Vec<f64>] {
        &self.inputs
    }

    /// Training outputs, aligned with [`TrainingSet::inputs`].
    #[must_use]
    pub fn outputs(&self) -> &[f64] {
        &self.outputs
    }

    /// Number of training samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.outputs.len()
    }

    /// Input dimensionality.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Leaf identifier of every training sample in every tree.
///
/// Logically a `n_samples × n_trees` matrix; stored tree-major so the
/// weight engine scans one tree's column contiguously.
#[derive(Debug, Clone)]
pub struct LeafAssignmentMatrix {
    leaves: Vec<usize>,
    n_samples: usize,
    n_trees: usize,
}

impl LeafAssignmentMatrix {
    /// Apply the forest to every training input.
    ///
    /// # Errors
    ///
    /// Propagates [`ForestModel::leaf_ids`] failures.
    pub fn build<F: ForestModel>(
        training: &TrainingSet,
        forest: &F,
    ) -> Result<Self, QuantileError> {
        let n_trees = forest.n_trees();
        let n_samples = training.n_samples();

        let per_sample: Vec<Vec<usize>> = training
            .inputs()
            .par_iter()
            .map(|input| forest.leaf_ids(input))
            .collect::<Result<_, QuantileError>>()?;

        let mut leaves = vec![0; n_samples * n_trees];
        for (sample, ids) in per_sample.iter().enumerate() {
            for (tree, &leaf) in ids.iter().enumerate() {
                leaves[tree * n_samples + sample] = leaf;
            }
        }

        Ok(Self {
            leaves,
            n_samples,
            n_trees,
        })
    }

    /// Leaf of training sample `sample` in tree `tree`.
    #[must_use]
    pub fn leaf(&self, sample: usize, tree: usize) -> usize {
        self.leaves[tree * self.n_samples + sample]
    }

    /// Leaves of all training samples in tree `tree`, in training order.
    #[must_use]
    pub fn tree_column(&self, tree: usize) -> &[usize] {
        let start = tree * self.n_samples;
        &self.leaves[start..start + self.n_samples]
    }

    /// Row count (training samples).
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Column count (trees).
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }
}

/// The training set together with its leaf assignment, built once at fit time.
#[derive(Debug, Clone)]
pub struct TrainingIndex {
    training: TrainingSet,
    leaves: LeafAssignmentMatrix,
}

impl TrainingIndex {
    /// Build the index for `training` under `forest`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::TrainingSetMismatch`] | training width differs from the forest's |
    /// | [`QuantileError::TrainingSetMismatch`] | an out-of-bag index exceeds the training set |
    /// | any [`ForestModel`] error | leaf lookup failed |
    #[instrument(skip_all, fields(n_samples = training.n_samples(), n_trees = forest.n_trees()))]
    pub fn build<F: ForestModel>(training: TrainingSet, forest: &F) -> Result<Self, QuantileError> {
        if training.n_features() != forest.n_features() {
            return Err(QuantileError::TrainingSetMismatch {
                reason: format!(
                    "training inputs have {} dimensions, forest expects {}",
                    training.n_features(),
                    forest.n_features()
                ),
            });
        }
        for tree in 0..forest.n_trees() {
            if let Some(&bad) = forest
                .oob_indices(tree)?
                .iter()
                .find(|&&i| i >= training.n_samples())
            {
                return Err(QuantileError::TrainingSetMismatch {
                    reason: format!(
                        "tree {tree} reports out-of-bag sample {bad} but the training set has {}",
                        training.n_samples()
                    ),
                });
            }
        }

        let leaves = LeafAssignmentMatrix::build(&training, forest)?;
        debug!(
            rows = leaves.n_samples(),
            cols = leaves.n_trees(),
            "leaf assignment matrix built"
        );
        Ok(Self { training, leaves })
    }

    /// The indexed training set.
    #[must_use]
    pub fn training(&self) -> &TrainingSet {
        &self.training
    }

    /// The leaf assignment matrix.
    #[must_use]
    pub fn leaves(&self) -> &LeafAssignmentMatrix {
        &self.leaves
    }

    /// Training outputs.
    #[must_use]
    pub fn outputs(&self) -> &[f64] {
        self.training.outputs()
    }
}
