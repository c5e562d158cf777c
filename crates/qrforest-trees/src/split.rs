use rand::Rng;

use crate::node::{FeatureIndex, Impurity};

/// Squared-error impurity from running sums: `Σy² - (Σy)² / n`.
///
/// Returns [`Impurity::new(0.0)`] for empty nodes and clamps tiny negative
/// values produced by cancellation.
#[must_use]
pub(crate) fn squared_error(sum: f64, sum_sq: f64, n_samples: usize) -> Impurity {
    if n_samples == 0 {
        return Impurity::new(0.0);
    }
    let value = sum_sq - sum * sum / n_samples as f64;
    Impurity::new(value.max(0.0))
}

/// Best variance-reducing split of a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Column tested.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Decrease in total squared error from this split.
    pub(crate) impurity_decrease: f64,
    /// Rows with `x <= threshold`.
    pub(crate) left_indices: Vec<usize>,
    /// Remaining rows.
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best variance-reducing split among a random subset of features.
///
/// For each of `max_features` randomly chosen features, sorts the
/// `(value, sample)` pairs, scans left-to-right with incremental sums of
/// the target and its square, and keeps the boundary with the largest
/// squared-error decrease.
///
/// Returns `None` when no valid split exists (all values identical,
/// the split would violate `min_samples_leaf`, or no split decreases the
/// impurity).
///
/// # Column-major layout
///
/// `features` is column-major: `features[feature_idx][sample_idx]`.
/// `sample_indices` are indices into these inner Vecs.
pub(crate) fn find_best_split(
    features: &[Vec<f64>],
    targets: &[f64],
    sample_indices: &[usize],
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = features.len();
    let n_samples = sample_indices.len();

    if n_samples < 2 || n_features == 0 {
        return None;
    }

    let (total_sum, total_sq) = sample_indices.iter().fold((0.0, 0.0), |(s, sq), &si| {
        let y = targets[si];
        (s + y, sq + y * y)
    });
    let parent = squared_error(total_sum, total_sq, n_samples).value();

    // Only the first `take` slots need shuffling.
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }

    let mut best_decrease = 0.0;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for &feat_idx in &feature_order[..take] {
        let feat_col = &features[feat_idx];

        let mut sorted: Vec<(f64, usize)> = sample_indices
            .iter()
            .map(|&si| (feat_col[si], si))
            .collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            let y = targets[si];
            left_sum += y;
            left_sq += y * y;

            let n_left = i + 1;
            let n_right = n_samples - n_left;

            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let left = squared_error(left_sum, left_sq, n_left).value();
            let right =
                squared_error(total_sum - left_sum, total_sq - left_sq, n_right).value();
            let decrease = parent - left - right;

            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((FeatureIndex::new(feat_idx), (val_i + val_next) / 2.0));
            }
        }
    }

    let (feature, threshold) = best?;

    let feat_col = &features[feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .copied()
        .partition(|&si| feat_col[si] <= threshold);

    Some(SplitResult {
        feature,
        threshold,
        impurity_decrease: best_decrease,
        left_indices,
        right_indices,
    })
}
