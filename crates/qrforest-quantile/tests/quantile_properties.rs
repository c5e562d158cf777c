//! Statistical properties of quantile estimates on synthetic regression data.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use qrforest_quantile::{
    ImportanceConfig, OptimMethod, QuantileForest, QuantileForestConfig, QuantileResult,
    Strategy, TreeSelection,
};
use qrforest_trees::RandomForestRegressor;

// ---------------------------------------------------------------------------
// Helpers: seeded Gaussian noise and the y = 3x + noise dataset
// ---------------------------------------------------------------------------

/// Standard normal draw via the Box-Muller transform.
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// 200 points evenly spaced on [0, 5] with `y = 3x + N(0, 1)`.
fn linear_with_noise(seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = 200;
    let inputs: Vec<Vec<f64>> = (0..n).map(|i| vec![5.0 * i as f64 / (n - 1) as f64]).collect();
    let outputs: Vec<f64> = inputs.iter().map(|x| 3.0 * x[0] + gaussian(&mut rng)).collect();
    (inputs, outputs)
}

fn fitted(seed: u64) -> QuantileForest<RandomForestRegressor> {
    let (inputs, outputs) = linear_with_noise(seed);
    QuantileForestConfig::new(50)
        .unwrap()
        .with_seed(seed)
        .fit(&inputs, &outputs)
        .unwrap()
}

const STRATEGIES: [Strategy; 3] = [
    Strategy::Inversion,
    Strategy::Optimize(OptimMethod::Cobyla),
    Strategy::Optimize(OptimMethod::Sqp),
];

fn max_output_gap(model: &QuantileForest<RandomForestRegressor>) -> f64 {
    let mut sorted = model.training().outputs().to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.windows(2).map(|w| w[1] - w[0]).fold(0.0, f64::max)
}

// ---------------------------------------------------------------------------
// Weight normalization
// ---------------------------------------------------------------------------

#[test]
fn forest_weights_are_a_distribution() {
    let model = fitted(0);
    let queries: Vec<f64> = (0..11).map(|i| i as f64 * 0.5).collect();
    for w in model.weights(queries, TreeSelection::Forest).unwrap() {
        assert!(w.iter().all(|&v| v >= 0.0));
        let total: f64 = w.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
    }
}

// ---------------------------------------------------------------------------
// Monotonicity in alpha
// ---------------------------------------------------------------------------

#[test]
fn quantiles_increase_with_alpha() {
    let model = fitted(1);
    let alphas: Vec<f64> = (1..20).map(|k| k as f64 * 0.05).collect();
    for strategy in STRATEGIES {
        for x in [0.3, 2.5, 4.8] {
            let q = model
                .compute_quantile(x, alphas.clone(), strategy, TreeSelection::Forest)
                .unwrap()
                .values();
            assert!(
                q.windows(2).all(|w| w[0] <= w[1] + 1e-9),
                "{strategy} at x = {x}: {q:?}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy agreement and median correspondence
// ---------------------------------------------------------------------------

#[test]
fn optimization_agrees_with_inversion() {
    let model = fitted(2);
    let tolerance = max_output_gap(&model) + 1e-6;
    let alphas = vec![0.1, 0.3, 0.5, 0.7, 0.9];
    let queries = vec![0.7, 2.0, 3.3, 4.6];

    let reference = model
        .compute_quantile(queries.clone(), alphas.clone(), Strategy::Inversion, TreeSelection::Forest)
        .unwrap()
        .values();
    for method in [OptimMethod::Cobyla, OptimMethod::Sqp] {
        let optimized = model
            .compute_quantile(
                queries.clone(),
                alphas.clone(),
                Strategy::Optimize(method),
                TreeSelection::Forest,
            )
            .unwrap()
            .values();
        for (a, b) in reference.iter().zip(&optimized) {
            assert!((a - b).abs() <= tolerance, "{method}: {a} vs {b}");
        }
    }
}

/// Heavy noise on a product surface leaves iterates next to support points
/// whose CDF step sits just below alpha.
#[test]
fn sqp_converges_on_heavy_noise_surface() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let inputs: Vec<Vec<f64>> = (0..300)
        .map(|_| vec![rng.gen_range(0.0..5.0), rng.gen_range(0.0..5.0)])
        .collect();
    let outputs: Vec<f64> = inputs
        .iter()
        .map(|x| x[0] * x[1] + 1e3 * gaussian(&mut rng))
        .collect();
    let model = QuantileForestConfig::new(30)
        .unwrap()
        .with_seed(3)
        .fit(&inputs, &outputs)
        .unwrap();

    let tolerance = max_output_gap(&model) + 1e-6;
    let alphas: Vec<f64> = (1..20).map(|k| k as f64 * 0.05).collect();
    let mut queries: Vec<Vec<f64>> = (0..9)
        .map(|_| vec![rng.gen_range(0.0..5.0), rng.gen_range(0.0..5.0)])
        .collect();
    queries.push(vec![4.6004, 1.6977]);

    for query in queries {
        let reference = model
            .compute_quantile(
                query.clone(),
                alphas.clone(),
                Strategy::Inversion,
                TreeSelection::Forest,
            )
            .unwrap()
            .values();
        let sqp = model
            .compute_quantile(
                query.clone(),
                alphas.clone(),
                Strategy::Optimize(OptimMethod::Sqp),
                TreeSelection::Forest,
            )
            .unwrap_or_else(|e| panic!("sqp failed at {query:?}: {e}"))
            .values();
        for ((alpha, a), b) in alphas.iter().zip(&reference).zip(&sqp) {
            assert!((a - b).abs() <= tolerance, "{query:?} alpha {alpha}: {a} vs {b}");
        }
    }
}

#[test]
fn inversion_median_is_weighted_median() {
    let model = fitted(3);
    let outputs = model.training().outputs();
    let grid = model.cdf_grid().values().to_vec();
    let step = grid.windows(2).map(|w| w[1] - w[0]).fold(0.0, f64::max);

    for x in [1.0, 2.2, 3.9] {
        let w = &model.weights(x, TreeSelection::Forest).unwrap()[0];
        let mut pairs: Vec<(f64, f64)> = outputs.iter().copied().zip(w.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut running = 0.0;
        let median = pairs
            .iter()
            .find(|&&(_, wi)| {
                running += wi;
                running >= 0.5
            })
            .map(|p| p.0)
            .unwrap();

        let q = model
            .compute_quantile(x, 0.5, Strategy::Inversion, TreeSelection::Forest)
            .unwrap()
            .as_scalar()
            .unwrap();
        assert!((q - median).abs() <= step, "x = {x}: {q} vs weighted median {median}");
    }
}

// ---------------------------------------------------------------------------
// Shape contract
// ---------------------------------------------------------------------------

#[test]
fn result_shape_follows_query_and_level_counts() {
    let model = fitted(4);
    let s = Strategy::Inversion;
    let f = TreeSelection::Forest;

    assert!(matches!(model.compute_quantile(1.0, 0.5, s, f).unwrap(), QuantileResult::Scalar(_)));
    match model.compute_quantile(1.0, vec![0.1, 0.9], s, f).unwrap() {
        QuantileResult::Vector(v) => assert_eq!(v.len(), 2),
        other => panic!("expected vector, got {other:?}"),
    }
    match model.compute_quantile(vec![1.0, 2.0, 3.0], 0.5, s, f).unwrap() {
        QuantileResult::Vector(v) => assert_eq!(v.len(), 3),
        other => panic!("expected vector, got {other:?}"),
    }
    match model.compute_quantile(vec![1.0, 2.0, 3.0], vec![0.1, 0.9], s, f).unwrap() {
        QuantileResult::Matrix(m) => {
            assert_eq!(m.len(), 3);
            assert!(m.iter().all(|row| row.len() == 2));
        }
        other => panic!("expected matrix, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Concrete scenario: y = 3x + N(0, 1), query x = 3
// ---------------------------------------------------------------------------

#[test]
fn upper_quantile_at_three_matches_noise_offset() {
    let model = fitted(0);
    for strategy in STRATEGIES {
        let q90 = model
            .compute_quantile(3.0, 0.9, strategy, TreeSelection::Forest)
            .unwrap()
            .as_scalar()
            .unwrap();
        let q10 = model
            .compute_quantile(3.0, 0.1, strategy, TreeSelection::Forest)
            .unwrap()
            .as_scalar()
            .unwrap();
        assert!((9.5..=11.0).contains(&q90), "{strategy}: q90 = {q90}");
        assert!(q90 > q10, "{strategy}: q90 {q90} <= q10 {q10}");
    }
}

// ---------------------------------------------------------------------------
// Importance: informative versus independent noise covariate
// ---------------------------------------------------------------------------

#[test]
fn noise_covariate_importance_near_zero() {
    let (inputs, outputs) = linear_with_noise(5);
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let inputs: Vec<Vec<f64>> = inputs
        .into_iter()
        .map(|x| vec![x[0], rng.gen_range(0.0..5.0)])
        .collect();
    let model = QuantileForestConfig::new(40)
        .unwrap()
        .with_seed(5)
        .fit(&inputs, &outputs)
        .unwrap();

    let imp = model
        .compute_importance_with(0.5, &ImportanceConfig::new().with_seed(17).with_n_jobs(Some(2)))
        .unwrap();
    let informative = imp.values()[0];
    let noise = imp.values()[1];
    assert!(informative > 1.0, "informative importance {informative}");
    assert!(noise.abs() < 0.5, "noise importance {noise}");
    assert!(informative > noise);
    assert_eq!(imp.ranked()[0].feature, 0);
}

#[test]
fn importance_is_reproducible_for_a_seed() {
    let model = fitted(6);
    let config = ImportanceConfig::new().with_seed(3);
    let first = model.compute_importance_with(0.9, &config).unwrap();
    let second = model.compute_importance_with(0.9, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn optimized_importance_runs_per_tree() {
    let (inputs, outputs) = linear_with_noise(8);
    let model = QuantileForestConfig::new(8)
        .unwrap()
        .with_seed(8)
        .fit(&inputs, &outputs)
        .unwrap();
    let config = ImportanceConfig::new().with_strategy(Strategy::Optimize(OptimMethod::Cobyla));
    let imp = model.compute_importance_with(0.5, &config).unwrap();
    assert_eq!(imp.n_trees_used(), 8);
    assert!(imp.values()[0] > 0.0);
}
