//! Leaf-sharing weights over the training set.

use crate::error::QuantileError;
use crate::training::LeafAssignmentMatrix;

/// Forest weights: the per-tree normalized leaf indicator averaged over trees.
///
/// `query_leaves[t]` is the query's leaf in tree `t`. The result sums to one.
///
/// # Errors
///
/// Returns [`QuantileError::EmptyLeaf`] when a tree assigns the query to a
/// leaf no training sample occupies.
pub(crate) fn forest_weights(
    query_leaves: &[usize],
    leaves: &LeafAssignmentMatrix,
) -> Result<Vec<f64>, QuantileError> {
    let n_trees = leaves.n_trees();
    let mut weights = vec![0.0; leaves.n_samples()];

    for (tree, &leaf) in query_leaves.iter().enumerate().take(n_trees) {
        let column = leaves.tree_column(tree);
        let occupancy = column.iter().filter(|&&l| l == leaf).count();
        if occupancy == 0 {
            return Err(QuantileError::EmptyLeaf { tree, leaf });
        }
        let share = 1.0 / (occupancy as f64 * n_trees as f64);
        for (w, _) in weights.iter_mut().zip(column).filter(|(_, l)| **l == leaf) {
            *w += share;
        }
    }

    Ok(weights)
}

/// Single-tree weights: the indicator of sharing `leaf` in `tree`, normalized
/// by occupancy.
///
/// With `members`, only those training samples are eligible and occupancy is
/// counted among them, which is how an out-of-bag view is weighted.
///
/// # Errors
///
/// Returns [`QuantileError::EmptyLeaf`] when no eligible sample sits in `leaf`.
pub(crate) fn tree_weights(
    tree: usize,
    leaf: usize,
    leaves: &LeafAssignmentMatrix,
    members: Option<&[usize]>,
) -> Result<Vec<f64>, QuantileError> {
    let column = leaves.tree_column(tree);
    let mut weights = vec![0.0; leaves.n_samples()];

    let hits: Vec<usize> = match members {
        Some(members) => members
            .iter()
            .copied()
            .filter(|&i| column[i] == leaf)
            .collect(),
        None => (0..column.len()).filter(|&i| column[i] == leaf).collect(),
    };
    if hits.is_empty() {
        return Err(QuantileError::EmptyLeaf { tree, leaf });
    }

    let share = 1.0 / hits.len() as f64;
    for i in hits {
        weights[i] = share;
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ForestModel;
    use crate::training::TrainingSet;

    /// Two trees over four samples: tree 0 leaves [0, 0, 1, 1], tree 1 leaves [0, 1, 1, 1].
    struct TwoTrees {
        oob: Vec<Vec<usize>>,
    }

    impl ForestModel for TwoTrees {
        fn n_trees(&self) -> usize {
            2
        }

        fn n_features(&self) -> usize {
            1
        }

        fn tree_leaf(&self, tree: usize, sample: &[f64]) -> Result<usize, QuantileError> {
            let x = sample[0];
            Ok(match tree {
                0 => usize::from(x >= 2.0),
                _ => usize::from(x >= 1.0),
            })
        }

        fn oob_indices(&self, tree: usize) -> Result<&[usize], QuantileError> {
            Ok(&self.oob[tree])
        }
    }

    fn matrix() -> LeafAssignmentMatrix {
        let training = TrainingSet::new(
            vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]],
            vec![10.0, 11.0, 12.0, 13.0],
        )
        .unwrap();
        let forest = TwoTrees {
            oob: vec![vec![0], vec![3]],
        };
        LeafAssignmentMatrix::build(&training, &forest).unwrap()
    }

    #[test]
    fn forest_weights_average_tree_shares() {
        let leaves = matrix();
        // Query at x = 0: tree 0 leaf 0 (samples 0, 1), tree 1 leaf 0 (sample 0).
        let w = forest_weights(&[0, 0], &leaves).unwrap();
        let expected = [0.5 * 0.5 + 0.5, 0.5 * 0.5, 0.0, 0.0];
        for (got, want) in w.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{w:?}");
        }
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tree_weights_normalize_by_occupancy() {
        let leaves = matrix();
        let w = tree_weights(1, 1, &leaves, None).unwrap();
        let third = 1.0 / 3.0;
        assert_eq!(w, vec![0.0, third, third, third]);
    }

    #[test]
    fn restricted_members_change_occupancy() {
        let leaves = matrix();
        let w = tree_weights(1, 1, &leaves, Some(&[3])).unwrap();
        assert_eq!(w, vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_restricted_leaf_is_an_error() {
        let leaves = matrix();
        let err = tree_weights(0, 1, &leaves, Some(&[0])).unwrap_err();
        assert!(matches!(err, QuantileError::EmptyLeaf { tree: 0, leaf: 1 }));
    }

    #[test]
    fn unseen_leaf_in_forest_mode_is_an_error() {
        let leaves = matrix();
        let err = forest_weights(&[0, 7], &leaves).unwrap_err();
        assert!(matches!(err, QuantileError::EmptyLeaf { tree: 1, leaf: 7 }));
    }
}
