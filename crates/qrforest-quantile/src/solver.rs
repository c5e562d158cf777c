//! Turning a weight vector into quantiles.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::cdf::CdfGrid;
use crate::error::QuantileError;
use crate::loss::weighted_pinball;
use crate::optim::{self, ConstrainedProblem, OptimConfig, OptimMethod};

/// How a quantile is resolved from a weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Strategy {
    /// Minimize the weighted pinball loss subject to the CDF reaching alpha.
    Optimize(OptimMethod),
    /// Invert the weighted CDF over the cached grid.
    Inversion,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Optimize(OptimMethod::Cobyla)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Optimize(method) => write!(f, "{method}"),
            Strategy::Inversion => f.write_str("inversion"),
        }
    }
}

impl FromStr for Strategy {
    type Err = QuantileError;

    /// Parse `cobyla`, `sqp` or `inversion` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("inversion") {
            return Ok(Strategy::Inversion);
        }
        s.parse::<OptimMethod>().map(Strategy::Optimize)
    }
}

/// The nonzero-weight training outputs, sorted, with running CDF.
#[derive(Debug, Clone)]
pub(crate) struct WeightedSupport {
    /// `(output, weight)` pairs in ascending output order.
    points: Vec<(f64, f64)>,
    cumulative: Vec<f64>,
}

impl WeightedSupport {
    pub(crate) fn new(outputs: &[f64], weights: &[f64]) -> Self {
        let mut points: Vec<(f64, f64)> = outputs
            .iter()
            .zip(weights)
            .filter(|&(_, &w)| w != 0.0)
            .map(|(&y, &w)| (y, w))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut running = 0.0;
        let cumulative = points
            .iter()
            .map(|&(_, w)| {
                running += w;
                running
            })
            .collect();
        Self { points, cumulative }
    }

    fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Weighted CDF `Σ w_i · 1{y_i <= q}`.
    fn cdf(&self, q: f64) -> f64 {
        match self.points.partition_point(|&(y, _)| y <= q) {
            0 => 0.0,
            k => self.cumulative[k - 1],
        }
    }

    fn spread(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(lo), Some(hi)) => hi.0 - lo.0,
            _ => 0.0,
        }
    }

    /// Linearly interpolated percentile of the support outputs, ignoring weights.
    fn percentile(&self, alpha: f64) -> f64 {
        let n = self.points.len();
        if n == 1 {
            return self.points[0].0;
        }
        let position = alpha * (n - 1) as f64;
        let lo = position.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = position - lo as f64;
        let (a, b) = (self.points[lo].0, self.points[hi].0);
        a + (b - a) * frac
    }

    /// Largest support output at or below `x`, if any.
    fn floor_point(&self, x: f64) -> Option<f64> {
        match self.points.partition_point(|&(y, _)| y <= x) {
            0 => None,
            k => Some(self.points[k - 1].0),
        }
    }
}

struct PinballProblem<'a> {
    support: &'a WeightedSupport,
    alpha: f64,
}

impl ConstrainedProblem for PinballProblem<'_> {
    fn objective(&self, q: f64) -> f64 {
        weighted_pinball(&self.support.points, q, self.alpha)
    }

    fn constraint(&self, q: f64) -> f64 {
        self.support.cdf(q) - self.alpha
    }
}

/// Quantile at `alpha` by constrained pinball minimization.
///
/// Starts from the unweighted `alpha`-percentile of the support. The loss is
/// linear between support points with slope `cdf - alpha`, so a feasible
/// solver result is moved down to the support point beneath it.
///
/// # Errors
///
/// Returns [`QuantileError::NonConvergence`] from the solver, including when
/// the support carries no weight at all.
pub(crate) fn optimize_quantile(
    support: &WeightedSupport,
    alpha: f64,
    method: OptimMethod,
    config: &OptimConfig,
) -> Result<f64, QuantileError> {
    if support.is_empty() {
        return Err(QuantileError::NonConvergence {
            method: method.name(),
            iterations: 0,
            violation: alpha,
        });
    }

    let problem = PinballProblem { support, alpha };
    let x0 = support.percentile(alpha);
    let solution = optim::minimize(method, &problem, x0, support.spread(), config)?;

    trace!(
        method = method.name(),
        alpha,
        iterations = solution.iterations,
        x = solution.x,
        "solver finished"
    );

    let x = solution.x;
    let refined = support
        .floor_point(x)
        .filter(|&y| problem.constraint(y) >= -config.constraint_tol())
        .filter(|&y| problem.objective(y) <= problem.objective(x));
    Ok(refined.unwrap_or(x))
}

/// Quantiles at every level in `alphas` for one weight vector.
///
/// `grid` is only consulted by [`Strategy::Inversion`].
///
/// # Errors
///
/// Propagates [`optimize_quantile`] failures.
pub(crate) fn resolve<'g>(
    outputs: &[f64],
    weights: &[f64],
    alphas: &[f64],
    strategy: Strategy,
    config: &OptimConfig,
    grid: impl FnOnce() -> &'g CdfGrid,
) -> Result<Vec<f64>, QuantileError> {
    match strategy {
        Strategy::Inversion => {
            let grid = grid();
            let cdf = grid.cdf(weights);
            Ok(alphas.iter().map(|&alpha| grid.invert(&cdf, alpha)).collect())
        }
        Strategy::Optimize(method) => {
            let support = WeightedSupport::new(outputs, weights);
            alphas
                .iter()
                .map(|&alpha| optimize_quantile(&support, alpha, method, config))
                .collect()
        }
    }
}
