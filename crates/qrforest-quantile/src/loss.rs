//! Pinball (check) loss.

/// Pinball loss of estimate `q` for observation `y` at level `alpha`:
/// `(y - q) * (alpha - 1{y - q < 0})`.
#[inline]
#[must_use]
pub fn pinball_loss(y: f64, q: f64, alpha: f64) -> f64 {
    let u = y - q;
    if u < 0.0 { u * (alpha - 1.0) } else { u * alpha }
}

/// Mean pinball loss over paired observations and estimates.
///
/// Returns 0 for empty input.
#[must_use]
pub fn mean_pinball_loss(observed: &[f64], estimated: &[f64], alpha: f64) -> f64 {
    if observed.is_empty() {
        return 0.0;
    }
    let total: f64 = observed
        .iter()
        .zip(estimated)
        .map(|(&y, &q)| pinball_loss(y, q, alpha))
        .sum();
    total / observed.len() as f64
}

/// Weighted pinball objective `Σ w_i · loss(y_i, q)` over `(y_i, w_i)` pairs.
pub(crate) fn weighted_pinball(support: &[(f64, f64)], q: f64, alpha: f64) -> f64 {
    support
        .iter()
        .map(|&(y, w)| w * pinball_loss(y, q, alpha))
        .sum()
}
