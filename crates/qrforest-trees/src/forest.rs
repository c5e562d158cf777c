//! Bootstrap regression forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{ForestConfig, MaxFeatures};
use crate::error::TreeError;
use crate::tree::{RegressionTree, RegressionTreeConfig};

/// A fitted bootstrap regression forest.
///
/// Besides the trees, the forest keeps each tree's out-of-bag index set:
/// the training samples that were never drawn into that tree's bootstrap
/// sample.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForestRegressor {
    pub(crate) trees: Vec<RegressionTree>,
    pub(crate) oob_indices: Vec<Vec<usize>>,
    pub(crate) n_features: usize,
    pub(crate) n_samples: usize,
}

/// Validate a row-major training set and return its feature count.
pub(crate) fn validate_dataset(features: &[Vec<f64>], targets: &[f64]) -> Result<usize, TreeError> {
    if features.is_empty() {
        return Err(TreeError::EmptyDataset);
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(TreeError::ZeroFeatures);
    }
    if targets.len() != features.len() {
        return Err(TreeError::TargetCountMismatch {
            n_samples: features.len(),
            n_targets: targets.len(),
        });
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(TreeError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(TreeError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    if let Some(sample_index) = targets.iter().position(|y| !y.is_finite()) {
        return Err(TreeError::NonFiniteTarget { sample_index });
    }
    Ok(n_features)
}

/// Resolve `MaxFeatures` to a concrete count.
pub(crate) fn resolve_max_features(
    max_features: MaxFeatures,
    n_features: usize,
) -> Result<usize, TreeError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
        MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
        MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        MaxFeatures::Fixed(n) => n,
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(TreeError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Generate a bootstrap sample and the out-of-bag indices.
fn bootstrap_sample(
    n_samples: usize,
    draw_count: usize,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Train the forest ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
pub(crate) fn train(
    config: &ForestConfig,
    features: &[Vec<f64>],
    targets: &[f64],
) -> Result<RandomForestRegressor, TreeError> {
    let n_features = validate_dataset(features, targets)?;
    let n_samples = features.len();

    let max_features_resolved = resolve_max_features(config.max_features, n_features)?;
    if config.bootstrap_fraction <= 0.0 || config.bootstrap_fraction > 1.0 {
        return Err(TreeError::InvalidBootstrapFraction {
            fraction: config.bootstrap_fraction,
        });
    }
    let draw_count = ((n_samples as f64) * config.bootstrap_fraction).ceil() as usize;

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        max_features = max_features_resolved,
        max_leaf_nodes = ?config.max_leaf_nodes,
        draw_count,
        "training regression forest"
    );

    // Per-tree seeds from the master RNG keep results independent of scheduling.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let tree_config = RegressionTreeConfig::new()
        .with_max_depth(config.max_depth)
        .with_max_leaf_nodes(config.max_leaf_nodes)
        .with_min_samples_split(config.min_samples_split)
        .with_min_samples_leaf(config.min_samples_leaf)
        .with_max_features(Some(max_features_resolved));

    let tree_results: Vec<(RegressionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (bootstrap_indices, oob_indices) =
                bootstrap_sample(n_samples, draw_count, &mut rng);

            let boot_features: Vec<Vec<f64>> = bootstrap_indices
                .iter()
                .map(|&i| features[i].clone())
                .collect();
            let boot_targets: Vec<f64> = bootstrap_indices.iter().map(|&i| targets[i]).collect();

            let tree = tree_config
                .clone()
                .with_seed(rng.r#gen())
                .fit(&boot_features, &boot_targets)?;
            Ok::<_, TreeError>((tree, oob_indices))
        })
        .collect::<Result<_, TreeError>>()?;

    let (trees, oob_indices): (Vec<_>, Vec<_>) = tree_results.into_iter().unzip();

    debug!(
        n_trees_trained = trees.len(),
        mean_oob = oob_indices.iter().map(Vec::len).sum::<usize>() as f64 / trees.len() as f64,
        "tree training complete"
    );

    Ok(RandomForestRegressor {
        trees,
        oob_indices,
        n_features,
        n_samples,
    })
}
