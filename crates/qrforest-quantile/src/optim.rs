//! Scalar minimization under one inequality constraint.
//!
//! Two solvers share an acceptance rule: a candidate replaces the incumbent
//! when it reduces constraint violation, or, once both are feasible, when it
//! lowers the objective.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::QuantileError;

/// Which constrained solver the optimization strategy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum OptimMethod {
    /// Derivative-free compass search: probes `x ± rho` and halves `rho`
    /// on failure. Named after COBYLA but keeps no simplex or linear models.
    #[default]
    Cobyla,
    /// Sequential quadratic steps from central finite differences.
    Sqp,
}

impl OptimMethod {
    /// Lowercase solver name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            OptimMethod::Cobyla => "cobyla",
            OptimMethod::Sqp => "sqp",
        }
    }
}

impl fmt::Display for OptimMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptimMethod {
    type Err = QuantileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cobyla" => Ok(OptimMethod::Cobyla),
            "sqp" => Ok(OptimMethod::Sqp),
            _ => Err(QuantileError::UnsupportedStrategy {
                name: s.to_string(),
            }),
        }
    }
}

/// Iteration limits and tolerances for the constrained solvers.
///
/// # Defaults
///
/// | Parameter        | Default |
/// |------------------|---------|
/// | `max_iter`       | 1000    |
/// | `tol`            | 1e-6    |
/// | `constraint_tol` | 1e-12   |
/// | `epsilon_scale`  | 0.1     |
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OptimConfig {
    max_iter: usize,
    tol: f64,
    constraint_tol: f64,
    epsilon_scale: f64,
}

impl Default for OptimConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tol: 1e-6,
            constraint_tol: 1e-12,
            epsilon_scale: 0.1,
        }
    }
}

impl OptimConfig {
    /// Create a config with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration budget.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the final step size at which the solvers stop.
    #[must_use]
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the largest constraint violation still treated as feasible.
    #[must_use]
    pub fn with_constraint_tol(mut self, constraint_tol: f64) -> Self {
        self.constraint_tol = constraint_tol;
        self
    }

    /// Set the SQP perturbation relative to the starting value's magnitude.
    #[must_use]
    pub fn with_epsilon_scale(mut self, epsilon_scale: f64) -> Self {
        self.epsilon_scale = epsilon_scale;
        self
    }

    /// Return the iteration budget.
    #[must_use]
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// Return the final step size.
    #[must_use]
    pub fn tol(&self) -> f64 {
        self.tol
    }

    /// Return the feasibility tolerance.
    #[must_use]
    pub fn constraint_tol(&self) -> f64 {
        self.constraint_tol
    }

    /// Return the SQP perturbation scale.
    #[must_use]
    pub fn epsilon_scale(&self) -> f64 {
        self.epsilon_scale
    }

    /// Check every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`QuantileError::InvalidOptimConfig`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), QuantileError> {
        let invalid = |parameter: &'static str, value: f64| {
            Err(QuantileError::InvalidOptimConfig { parameter, value })
        };
        if self.max_iter == 0 {
            return invalid("max_iter", 0.0);
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return invalid("tol", self.tol);
        }
        if !(self.constraint_tol.is_finite() && self.constraint_tol >= 0.0) {
            return invalid("constraint_tol", self.constraint_tol);
        }
        if !(self.epsilon_scale.is_finite() && self.epsilon_scale > 0.0) {
            return invalid("epsilon_scale", self.epsilon_scale);
        }
        Ok(())
    }
}

/// A scalar objective with one constraint `constraint(x) >= 0`.
///
/// Both solvers assume the constraint is nondecreasing in `x`: when the
/// constraint gives no local direction, an infeasible iterate moves right.
pub(crate) trait ConstrainedProblem {
    fn objective(&self, x: f64) -> f64;
    fn constraint(&self, x: f64) -> f64;
}

/// Where a solver stopped.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Solution {
    pub(crate) x: f64,
    pub(crate) iterations: usize,
}

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f64,
    f: f64,
    violation: f64,
}

impl Point {
    fn eval(problem: &impl ConstrainedProblem, x: f64) -> Self {
        Self {
            x,
            f: problem.objective(x),
            violation: (-problem.constraint(x)).max(0.0),
        }
    }
}

/// Lexicographic acceptance: violation first, objective once feasible.
fn improves(candidate: &Point, incumbent: &Point, constraint_tol: f64) -> bool {
    if candidate.violation > constraint_tol || incumbent.violation > constraint_tol {
        candidate.violation < incumbent.violation
    } else {
        candidate.f < incumbent.f
    }
}

fn finish(
    method: OptimMethod,
    point: Point,
    iterations: usize,
    config: &OptimConfig,
) -> Result<Solution, QuantileError> {
    if point.violation > config.constraint_tol {
        return Err(QuantileError::NonConvergence {
            method: method.name(),
            iterations,
            violation: point.violation,
        });
    }
    debug!(method = method.name(), iterations, x = point.x, "optimizer converged");
    Ok(Solution {
        x: point.x,
        iterations,
    })
}

/// Minimize `problem` from `x0` with the chosen solver.
///
/// `scale` is the problem's natural length (e.g. the spread of the data);
/// it sets the initial trust radius and bounds every step.
///
/// # Errors
///
/// Returns [`QuantileError::NonConvergence`] when the iteration budget runs
/// out or the final point violates the constraint beyond `constraint_tol`.
pub(crate) fn minimize(
    method: OptimMethod,
    problem: &impl ConstrainedProblem,
    x0: f64,
    scale: f64,
    config: &OptimConfig,
) -> Result<Solution, QuantileError> {
    let radius = if scale > 0.0 { scale } else { 1.0 };
    match method {
        OptimMethod::Cobyla => pattern_search(problem, x0, radius, config),
        OptimMethod::Sqp => sqp(problem, x0, radius, config),
    }
}

/// Derivative-free search: probe `x ± rho`, move on improvement, halve `rho` otherwise.
fn pattern_search(
    problem: &impl ConstrainedProblem,
    x0: f64,
    radius: f64,
    config: &OptimConfig,
) -> Result<Solution, QuantileError> {
    let ctol = config.constraint_tol;
    let mut current = Point::eval(problem, x0);
    let mut rho = radius;
    let mut iterations = 0;

    while rho >= config.tol {
        if iterations >= config.max_iter {
            return Err(QuantileError::NonConvergence {
                method: OptimMethod::Cobyla.name(),
                iterations,
                violation: current.violation,
            });
        }
        iterations += 1;

        let right = Point::eval(problem, current.x + rho);
        let left = Point::eval(problem, current.x - rho);
        let best = if improves(&left, &right, ctol) { left } else { right };

        if improves(&best, &current, ctol) {
            current = best;
        } else {
            rho *= 0.5;
        }
    }

    finish(OptimMethod::Cobyla, current, iterations, config)
}

const LINE_SEARCH_HALVINGS: usize = 30;

/// Walk right from an infeasible `current` in doubling steps, up to `radius`,
/// until the violation drops.
fn restore_feasibility(
    problem: &impl ConstrainedProblem,
    current: &Point,
    first_step: f64,
    radius: f64,
    constraint_tol: f64,
) -> Option<Point> {
    let mut step = first_step.min(radius);
    loop {
        let candidate = Point::eval(problem, current.x + step);
        if improves(&candidate, current, constraint_tol) {
            return Some(candidate);
        }
        if step >= radius {
            return None;
        }
        step = (step * 2.0).min(radius);
    }
}

/// Sequential quadratic programming on one variable.
///
/// Gradients come from central differences of width `h`, starting at
/// `epsilon_scale * |x0|`; curvature from a secant update. Each step solves
/// the quadratic model under the linearized constraint, then backtracks.
/// An infeasible iterate the line search cannot move is pushed right until
/// the violation drops, so `h` only shrinks to `tol` at a feasible point or
/// when no step within `radius` helps.
fn sqp(
    problem: &impl ConstrainedProblem,
    x0: f64,
    radius: f64,
    config: &OptimConfig,
) -> Result<Solution, QuantileError> {
    let ctol = config.constraint_tol;
    let mut h = if x0 != 0.0 {
        config.epsilon_scale * x0.abs()
    } else {
        config.epsilon_scale
    };
    let mut current = Point::eval(problem, x0);
    let mut curvature = 1.0;
    let mut previous: Option<(f64, f64)> = None;

    for iteration in 1..=config.max_iter {
        let x = current.x;
        let grad_f = (problem.objective(x + h) - problem.objective(x - h)) / (2.0 * h);
        let c = problem.constraint(x);
        let grad_c = (problem.constraint(x + h) - problem.constraint(x - h)) / (2.0 * h);

        if let Some((x_prev, grad_prev)) = previous {
            let s = x - x_prev;
            let y = grad_f - grad_prev;
            curvature = if s * y > 0.0 { y / s } else { 1.0 };
        }

        let mut d = -grad_f / curvature;
        if c + grad_c * d < 0.0 {
            d = if grad_c > 0.0 { -c / grad_c } else { radius };
        }
        d = d.clamp(-radius, radius);

        let mut accepted = None;
        let mut t = 1.0;
        for _ in 0..LINE_SEARCH_HALVINGS {
            let candidate = Point::eval(problem, x + t * d);
            if improves(&candidate, &current, ctol) {
                accepted = Some(candidate);
                break;
            }
            t *= 0.5;
        }

        let step = match accepted {
            Some(next) => {
                previous = Some((x, grad_f));
                current = next;
                (next.x - x).abs()
            }
            None if current.violation > ctol => {
                // Linearized steps stall inside a flat stretch of a step constraint.
                match restore_feasibility(problem, &current, h.max(config.tol), radius, ctol) {
                    Some(next) => {
                        previous = None;
                        current = next;
                        continue;
                    }
                    None => 0.0,
                }
            }
            None => 0.0,
        };

        if step < config.tol {
            if h <= config.tol {
                return finish(OptimMethod::Sqp, current, iteration, config);
            }
            h *= 0.5;
            previous = None;
        }
    }

    Err(QuantileError::NonConvergence {
        method: OptimMethod::Sqp.name(),
        iterations: config.max_iter,
        violation: current.violation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimize `(x - target)^2` subject to `x >= floor`.
    struct Parabola {
        target: f64,
        floor: f64,
    }

    impl ConstrainedProblem for Parabola {
        fn objective(&self, x: f64) -> f64 {
            (x - self.target).powi(2)
        }

        fn constraint(&self, x: f64) -> f64 {
            x - self.floor
        }
    }

    /// Minimize `|x - target|` with a step constraint active from `floor`.
    struct Kink {
        target: f64,
        floor: f64,
    }

    impl ConstrainedProblem for Kink {
        fn objective(&self, x: f64) -> f64 {
            (x - self.target).abs()
        }

        fn constraint(&self, x: f64) -> f64 {
            if x >= self.floor { 0.5 } else { -0.5 }
        }
    }

    #[test]
    fn unconstrained_optimum_found_by_both() {
        let problem = Parabola {
            target: 3.0,
            floor: -10.0,
        };
        for method in [OptimMethod::Cobyla, OptimMethod::Sqp] {
            let sol = minimize(method, &problem, 0.5, 5.0, &OptimConfig::default()).unwrap();
            assert!((sol.x - 3.0).abs() < 1e-4, "{method}: {}", sol.x);
        }
    }

    #[test]
    fn active_constraint_binds() {
        let problem = Parabola {
            target: 1.0,
            floor: 2.0,
        };
        for method in [OptimMethod::Cobyla, OptimMethod::Sqp] {
            let sol = minimize(method, &problem, 4.0, 5.0, &OptimConfig::default()).unwrap();
            assert!(sol.x >= 2.0 - 1e-12, "{method}: {}", sol.x);
            assert!((sol.x - 2.0).abs() < 1e-4, "{method}: {}", sol.x);
        }
    }

    #[test]
    fn infeasible_start_reaches_feasible_region() {
        let problem = Kink {
            target: 0.0,
            floor: 3.0,
        };
        for method in [OptimMethod::Cobyla, OptimMethod::Sqp] {
            let sol = minimize(method, &problem, 1.0, 4.0, &OptimConfig::default()).unwrap();
            assert!(sol.x >= 3.0, "{method}: {}", sol.x);
            assert!(sol.x - 3.0 < 1e-3, "{method}: {}", sol.x);
        }
    }

    /// Minimize `x` under a staircase: violated below `floor`, with a
    /// partial step at zero that keeps the linearized step inside `[0, floor)`.
    struct Staircase {
        floor: f64,
    }

    impl ConstrainedProblem for Staircase {
        fn objective(&self, x: f64) -> f64 {
            x
        }

        fn constraint(&self, x: f64) -> f64 {
            if x >= self.floor {
                0.5
            } else if x >= 0.0 {
                -0.1
            } else {
                -0.5
            }
        }
    }

    #[test]
    fn sqp_leaves_flat_infeasible_step() {
        let problem = Staircase { floor: 5.0 };
        let sol = minimize(OptimMethod::Sqp, &problem, 0.0, 10.0, &OptimConfig::default()).unwrap();
        assert!(sol.x >= 5.0, "{}", sol.x);
        assert!(sol.x - 5.0 < 1e-3, "{}", sol.x);
    }

    #[test]
    fn solutions_report_iterations_within_budget() {
        let problem = Parabola {
            target: 3.0,
            floor: -10.0,
        };
        let config = OptimConfig::default();
        for method in [OptimMethod::Cobyla, OptimMethod::Sqp] {
            let sol = minimize(method, &problem, 0.5, 5.0, &config).unwrap();
            assert!(
                (1..=config.max_iter()).contains(&sol.iterations),
                "{method}: {}",
                sol.iterations
            );
        }
    }

    #[test]
    fn exhausted_budget_is_non_convergence() {
        let problem = Parabola {
            target: 3.0,
            floor: -10.0,
        };
        let config = OptimConfig::default().with_max_iter(2);
        for method in [OptimMethod::Cobyla, OptimMethod::Sqp] {
            let err = minimize(method, &problem, 0.0, 5.0, &config).unwrap_err();
            assert!(matches!(err, QuantileError::NonConvergence { .. }), "{method}");
        }
    }

    #[test]
    fn unreachable_constraint_is_non_convergence() {
        struct Never;
        impl ConstrainedProblem for Never {
            fn objective(&self, x: f64) -> f64 {
                x * x
            }
            fn constraint(&self, _x: f64) -> f64 {
                -1.0
            }
        }
        let err = minimize(OptimMethod::Cobyla, &Never, 0.0, 1.0, &OptimConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            QuantileError::NonConvergence { method: "cobyla", .. }
        ));
    }

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!("COBYLA".parse::<OptimMethod>().unwrap(), OptimMethod::Cobyla);
        assert_eq!("Sqp".parse::<OptimMethod>().unwrap(), OptimMethod::Sqp);
        assert!(matches!(
            "nelder-mead".parse::<OptimMethod>(),
            Err(QuantileError::UnsupportedStrategy { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_limits() {
        assert!(OptimConfig::default().validate().is_ok());
        assert!(matches!(
            OptimConfig::default().with_tol(0.0).validate(),
            Err(QuantileError::InvalidOptimConfig { parameter: "tol", .. })
        ));
        assert!(matches!(
            OptimConfig::default().with_max_iter(0).validate(),
            Err(QuantileError::InvalidOptimConfig { parameter: "max_iter", .. })
        ));
        assert!(matches!(
            OptimConfig::default().with_epsilon_scale(-1.0).validate(),
            Err(QuantileError::InvalidOptimConfig { parameter: "epsilon_scale", .. })
        ));
    }
}
