//! End-to-end checks of bootstrap forest training on synthetic regression data.
//!
//! These guard the two properties the quantile layer relies on: leaf lookups
//! that agree across entry points, and out-of-bag sets that behave like
//! bootstrap complements.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use qrforest_trees::{ForestConfig, RandomForestRegressor, TreeError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `y = sin(x0) * 4 + x1` with uniform inputs on [0, 5) and small noise.
fn make_regression(n_samples: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let inputs: Vec<Vec<f64>> = (0..n_samples)
        .map(|_| vec![rng.r#gen::<f64>() * 5.0, rng.r#gen::<f64>() * 5.0])
        .collect();
    let targets: Vec<f64> = inputs
        .iter()
        .map(|x| x[0].sin() * 4.0 + x[1] + (rng.r#gen::<f64>() - 0.5) * 0.2)
        .collect();
    (inputs, targets)
}

fn fit(
    n_trees: usize,
    max_leaf_nodes: Option<usize>,
    seed: u64,
) -> (RandomForestRegressor, Vec<Vec<f64>>, Vec<f64>) {
    let (inputs, targets) = make_regression(300, seed);
    let forest = ForestConfig::new(n_trees)
        .unwrap()
        .with_max_leaf_nodes(max_leaf_nodes)
        .with_seed(seed)
        .fit(&inputs, &targets)
        .unwrap();
    (forest, inputs, targets)
}

// ---------------------------------------------------------------------------
// Out-of-bag sets
// ---------------------------------------------------------------------------

/// Reference: a full-size bootstrap leaves out about 1/e of the samples.
#[test]
fn oob_fraction_near_one_over_e() {
    let (forest, _, _) = fit(40, Some(20), 1);
    let total: usize = (0..forest.n_trees())
        .map(|t| forest.oob_indices(t).unwrap().len())
        .sum();
    let fraction = total as f64 / (forest.n_trees() * forest.n_samples()) as f64;
    assert!((0.33..=0.41).contains(&fraction), "oob fraction {fraction}");
}

#[test]
fn oob_indices_sorted_and_in_range() {
    let (forest, _, _) = fit(10, Some(20), 2);
    for t in 0..forest.n_trees() {
        let oob = forest.oob_indices(t).unwrap();
        assert!(oob.windows(2).all(|w| w[0] < w[1]));
        assert!(oob.iter().all(|&i| i < forest.n_samples()));
    }
    assert!(matches!(
        forest.oob_indices(10),
        Err(TreeError::TreeIndexOutOfRange { tree: 10, n_trees: 10 })
    ));
}

// ---------------------------------------------------------------------------
// Leaf lookups
// ---------------------------------------------------------------------------

#[test]
fn apply_agrees_with_apply_tree_and_lands_on_leaves() {
    let (forest, inputs, _) = fit(12, Some(16), 3);
    for sample in inputs.iter().take(50) {
        let leaves = forest.apply(sample).unwrap();
        assert_eq!(leaves.len(), forest.n_trees());
        for (t, leaf) in leaves.iter().enumerate() {
            assert_eq!(forest.apply_tree(t, sample).unwrap(), *leaf);
            assert!(forest.tree(t).unwrap().nodes()[leaf.index()].is_leaf());
        }
    }
}

#[test]
fn leaf_limit_caps_every_tree() {
    let (forest, _, _) = fit(15, Some(10), 4);
    for tree in forest.trees() {
        assert!(tree.n_leaves() <= 10, "tree has {} leaves", tree.n_leaves());
        assert!(tree.n_leaves() >= 2);
    }
}

#[test]
fn wrong_width_rejected() {
    let (forest, _, _) = fit(3, Some(8), 5);
    assert!(matches!(
        forest.apply(&[1.0]),
        Err(TreeError::PredictionFeatureMismatch { expected: 2, got: 1 })
    ));
}

// ---------------------------------------------------------------------------
// Prediction quality and determinism
// ---------------------------------------------------------------------------

/// Reference: unrestricted forests explain nearly all variance of this
/// smooth target in-sample.
#[test]
fn in_sample_r_squared_is_high() {
    let (forest, inputs, targets) = fit(30, None, 6);
    let predictions = forest.predict_batch(&inputs).unwrap();
    let mean = targets.iter().sum::<f64>() / targets.len() as f64;
    let ss_tot: f64 = targets.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = targets
        .iter()
        .zip(&predictions)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    let r2 = 1.0 - ss_res / ss_tot;
    assert!(r2 > 0.9, "r2 = {r2}");
}

#[test]
fn same_seed_same_forest() {
    let (a, inputs, _) = fit(8, Some(12), 7);
    let (b, _, _) = fit(8, Some(12), 7);
    assert_eq!(a.predict_batch(&inputs).unwrap(), b.predict_batch(&inputs).unwrap());
    for t in 0..a.n_trees() {
        assert_eq!(a.oob_indices(t).unwrap(), b.oob_indices(t).unwrap());
    }
}
