//! Edge cases driven through hand-built forests with known leaf layouts.

use qrforest_quantile::{
    ForestModel, ImportanceConfig, QuantileError, QuantileForest, QuantileSettings,
    SequentialExecutor, Strategy, TreeSelection,
};

// ---------------------------------------------------------------------------
// Stub forest: leaves computed by a plain function, out-of-bag sets given
// ---------------------------------------------------------------------------

struct StubForest {
    n_features: usize,
    oob: Vec<Vec<usize>>,
    leaf: fn(&[f64]) -> usize,
}

impl ForestModel for StubForest {
    fn n_trees(&self) -> usize {
        self.oob.len()
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn tree_leaf(&self, tree: usize, sample: &[f64]) -> Result<usize, QuantileError> {
        if tree >= self.oob.len() {
            return Err(QuantileError::InvalidTreeIndex {
                tree,
                n_trees: self.oob.len(),
            });
        }
        if sample.len() != self.n_features {
            return Err(QuantileError::DimensionMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok((self.leaf)(sample))
    }

    fn oob_indices(&self, tree: usize) -> Result<&[usize], QuantileError> {
        self.oob
            .get(tree)
            .map(Vec::as_slice)
            .ok_or(QuantileError::InvalidTreeIndex {
                tree,
                n_trees: self.oob.len(),
            })
    }
}

fn split_at_two(x: &[f64]) -> usize {
    usize::from(x[0] >= 2.0)
}

/// Every distinct `(x0, x1)` pair gets its own leaf.
fn pair_leaf(x: &[f64]) -> usize {
    (x[0] * 10.0 + x[1]) as usize
}

fn one_dim(oob: Vec<Vec<usize>>) -> QuantileForest<StubForest> {
    let forest = StubForest {
        n_features: 1,
        oob,
        leaf: split_at_two,
    };
    QuantileForest::from_forest(
        forest,
        vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]],
        vec![10.0, 11.0, 20.0, 21.0],
        QuantileSettings::default(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Empty leaves
// ---------------------------------------------------------------------------

#[test]
fn out_of_bag_leaf_without_members_is_an_error() {
    let model = one_dim(vec![vec![0, 1]]);
    let err = model
        .compute_quantile(3.0, 0.5, Strategy::Inversion, TreeSelection::TreeOutOfBag(0))
        .unwrap_err();
    assert!(matches!(err, QuantileError::EmptyLeaf { tree: 0, leaf: 1 }), "{err}");
}

#[test]
fn out_of_bag_leaf_with_members_is_uniform() {
    let model = one_dim(vec![vec![0, 1]]);
    let w = model.weights(0.5, TreeSelection::TreeOutOfBag(0)).unwrap();
    assert_eq!(w, vec![vec![0.5, 0.5, 0.0, 0.0]]);
}

#[test]
fn whole_tree_leaf_uses_all_samples() {
    let model = one_dim(vec![vec![0, 1]]);
    let w = model.weights(3.0, TreeSelection::Tree(0)).unwrap();
    assert_eq!(w, vec![vec![0.0, 0.0, 0.5, 0.5]]);
    let q = model
        .compute_quantile(3.0, 0.5, Strategy::Inversion, TreeSelection::Tree(0))
        .unwrap()
        .as_scalar()
        .unwrap();
    assert_eq!(q, 20.0);
}

#[test]
fn tree_outside_forest_rejected() {
    let model = one_dim(vec![vec![0, 1]]);
    for selection in [TreeSelection::Tree(1), TreeSelection::TreeOutOfBag(5)] {
        assert!(matches!(
            model.weights(1.0, selection),
            Err(QuantileError::InvalidTreeIndex { n_trees: 1, .. })
        ));
    }
}

// ---------------------------------------------------------------------------
// Importance over degenerate out-of-bag sets
// ---------------------------------------------------------------------------

#[test]
fn no_out_of_bag_samples_anywhere() {
    let model = one_dim(vec![vec![], vec![]]);
    assert!(matches!(
        model.compute_importance(0.5),
        Err(QuantileError::NoOutOfBagSamples)
    ));
}

#[test]
fn trees_without_out_of_bag_samples_are_skipped() {
    let model = one_dim(vec![vec![], vec![0, 3]]);
    let imp = model
        .compute_importance_on(0.5, &ImportanceConfig::new(), &SequentialExecutor)
        .unwrap();
    assert_eq!(imp.n_trees_used(), 1);
    assert_eq!(imp.values().len(), 1);
}

#[test]
fn restricted_importance_propagates_empty_leaf() {
    let inputs: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64, i as f64]).collect();
    let outputs: Vec<f64> = (0..8).map(|i| i as f64).collect();
    let forest = StubForest {
        n_features: 2,
        oob: vec![vec![0, 1, 2, 3, 4, 5]],
        leaf: pair_leaf,
    };
    let model =
        QuantileForest::from_forest(forest, inputs, outputs, QuantileSettings::default()).unwrap();

    let config = ImportanceConfig::new().with_restrict_to_oob(true);
    let err = model
        .compute_importance_on(0.5, &config, &SequentialExecutor)
        .unwrap_err();
    assert!(matches!(err, QuantileError::EmptyLeaf { tree: 0, .. }), "{err}");
}
