//! Out-of-bag permutation importance measured in pinball loss.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::config::ImportanceConfig;
use crate::error::QuantileError;
use crate::executor::TaskExecutor;
use crate::forest::QuantileForest;
use crate::loss::mean_pinball_loss;
use crate::model::ForestModel;
use crate::query::{TreeSelection, check_alpha};
use crate::solver::Strategy;

/// Mean loss increase per input dimension when that dimension is shuffled.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImportanceVector {
    values: Vec<f64>,
    std: Vec<f64>,
    n_trees_used: usize,
}

/// One dimension's importance with its rank.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RankedFeature {
    /// Input dimension.
    pub feature: usize,
    /// Mean loss increase across trees.
    pub importance: f64,
    /// Population standard deviation across trees.
    pub std: f64,
    /// Rank (1 = most important).
    pub rank: usize,
}

impl ImportanceVector {
    /// Mean importance per dimension. Positive means the dimension is informative.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Standard deviation across trees per dimension.
    #[must_use]
    pub fn std(&self) -> &[f64] {
        &self.std
    }

    /// Trees that had out-of-bag samples and contributed.
    #[must_use]
    pub fn n_trees_used(&self) -> usize {
        self.n_trees_used
    }

    /// Dimensions sorted by decreasing importance.
    #[must_use]
    pub fn ranked(&self) -> Vec<RankedFeature> {
        let mut ranked: Vec<RankedFeature> = self
            .values
            .iter()
            .zip(&self.std)
            .enumerate()
            .map(|(feature, (&importance, &std))| RankedFeature {
                feature,
                importance,
                std,
                rank: 0,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        for (i, entry) in ranked.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        ranked
    }
}

/// Per-tree permutation importance, reduced by mean across trees.
///
/// For each tree with a non-empty out-of-bag set: estimate single-tree
/// quantiles for its out-of-bag inputs, take the mean pinball loss against
/// their outputs, then repeat with each input column shuffled among those
/// rows. Importance is permuted loss minus baseline loss. Trees without
/// out-of-bag samples are left out of the mean.
#[instrument(skip_all, fields(alpha = alpha, n_trees = model.n_trees(), strategy = %config.strategy()))]
pub(crate) fn permutation_importance<F: ForestModel, E: TaskExecutor>(
    model: &QuantileForest<F>,
    alpha: f64,
    config: &ImportanceConfig,
    executor: &E,
) -> Result<ImportanceVector, QuantileError> {
    check_alpha(alpha)?;
    if config.strategy() == Strategy::Inversion {
        model.cdf_grid();
    }

    let tasks: Vec<usize> = (0..model.n_trees()).collect();
    let per_tree = executor.map(tasks, |tree| tree_importance(model, tree, alpha, config));
    let drops: Vec<Vec<f64>> = per_tree
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();

    if drops.is_empty() {
        return Err(QuantileError::NoOutOfBagSamples);
    }

    let n_used = drops.len() as f64;
    let (values, std): (Vec<f64>, Vec<f64>) = (0..model.n_features())
        .map(|feature| {
            let mean = drops.iter().map(|d| d[feature]).sum::<f64>() / n_used;
            let variance = drops
                .iter()
                .map(|d| (d[feature] - mean) * (d[feature] - mean))
                .sum::<f64>()
                / n_used;
            (mean, variance.sqrt())
        })
        .unzip();

    info!(
        n_trees_used = drops.len(),
        skipped = model.n_trees() - drops.len(),
        "permutation importance computed"
    );

    Ok(ImportanceVector {
        values,
        std,
        n_trees_used: drops.len(),
    })
}

/// Importance contribution of one tree, or `None` when it has no out-of-bag rows.
fn tree_importance<F: ForestModel>(
    model: &QuantileForest<F>,
    tree: usize,
    alpha: f64,
    config: &ImportanceConfig,
) -> Result<Option<Vec<f64>>, QuantileError> {
    let oob = model.forest().oob_indices(tree)?;
    if oob.is_empty() {
        debug!(tree, "no out-of-bag samples, skipping tree");
        return Ok(None);
    }

    let training = model.training();
    let rows: Vec<Vec<f64>> = oob.iter().map(|&i| training.inputs()[i].clone()).collect();
    let observed: Vec<f64> = oob.iter().map(|&i| training.outputs()[i]).collect();
    let selection = if config.restrict_to_oob() {
        TreeSelection::TreeOutOfBag(tree)
    } else {
        TreeSelection::Tree(tree)
    };
    let oob_loss = |rows: &[Vec<f64>]| -> Result<f64, QuantileError> {
        let estimates: Vec<f64> = model
            .quantile_rows(rows, &[alpha], config.strategy(), selection)?
            .into_iter()
            .map(|row| row[0])
            .collect();
        Ok(mean_pinball_loss(&observed, &estimates, alpha))
    };

    let baseline = oob_loss(&rows)?;
    let n_features = model.n_features();
    let mut drops = Vec::with_capacity(n_features);
    for feature in 0..n_features {
        let rng_seed = config
            .seed()
            .wrapping_add((tree as u64).wrapping_mul(n_features as u64))
            .wrapping_add(feature as u64);
        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);

        let mut column: Vec<f64> = rows.iter().map(|row| row[feature]).collect();
        column.shuffle(&mut rng);
        let permuted: Vec<Vec<f64>> = rows
            .iter()
            .zip(column)
            .map(|(row, value)| {
                let mut row = row.clone();
                row[feature] = value;
                row
            })
            .collect();

        drops.push(oob_loss(&permuted)? - baseline);
    }

    debug!(tree, n_oob = oob.len(), baseline, "tree importance computed");
    Ok(Some(drops))
}
