use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use qrforest_io::{DatasetReader, ExperimentName, ResultWriter};
use qrforest_quantile::{
    ImportanceConfig, LeafLimit, OptimConfig, QuantileForest, QuantileForestConfig,
    QuantileResult, QueryPoints, Strategy, TreeSelection,
};
use qrforest_trees::RandomForestRegressor;

#[derive(Parser)]
#[command(name = "qrforest")]
#[command(about = "Quantile regression forests: conditional quantiles and permutation importance")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Forest growth and quantile settings shared by `demo` and `fit`.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of trees in the forest
    #[arg(long, default_value_t = 50)]
    n_trees: usize,

    /// Leaf cap per tree (defaults to max(10, n_samples / 100))
    #[arg(long, conflicts_with = "unlimited_leaves")]
    max_leaf_nodes: Option<usize>,

    /// Grow trees without a leaf cap
    #[arg(long, default_value_t = false)]
    unlimited_leaves: bool,

    /// Minimum number of samples in a leaf
    #[arg(long, default_value_t = 1)]
    min_samples_leaf: usize,

    /// CDF grid size for inversion (0 = sorted training outputs)
    #[arg(long, default_value_t = 0)]
    cdf_points: usize,

    /// Iteration budget of the constrained optimizers
    #[arg(long, default_value_t = 1000)]
    max_iter: usize,

    /// Final step size at which the optimizers stop
    #[arg(long, default_value_t = 1e-6)]
    tol: f64,
}

/// Quantile levels, strategy, and tree selection for a query.
#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Quantile levels in (0, 1), comma-separated or repeated
    #[arg(long, value_delimiter = ',', default_value = "0.5")]
    alpha: Vec<f64>,

    /// Estimation strategy: "cobyla", "sqp", or "inversion"
    #[arg(long, default_value = "cobyla")]
    strategy: String,

    /// Weight by a single tree instead of the whole forest
    #[arg(long)]
    tree: Option<usize>,

    /// With --tree, weight only that tree's out-of-bag training samples
    #[arg(long, default_value_t = false, requires = "tree")]
    oob: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fit on synthetic y = 3x + N(0, 1) data and query it
    Demo {
        /// Number of training points spread evenly over [0, 5]
        #[arg(long, default_value_t = 200)]
        n_samples: usize,

        /// Query inputs, comma-separated
        #[arg(long, value_delimiter = ',', default_value = "3.0")]
        x: Vec<f64>,

        #[command(flatten)]
        query: QueryArgs,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Fit a quantile forest on a CSV dataset and save it
    Fit {
        /// Path to the training CSV file
        #[arg(long)]
        data: PathBuf,

        /// Response column (defaults to the last column)
        #[arg(long)]
        target: Option<String>,

        /// Where to write the fitted model
        #[arg(long)]
        model: PathBuf,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Estimate conditional quantiles with a saved model
    Quantile {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// CSV of query rows, one column per input dimension
        #[arg(long, conflicts_with = "x")]
        queries: Option<PathBuf>,

        /// Query inputs, comma-separated (one sample per value for 1-D models)
        #[arg(long, value_delimiter = ',')]
        x: Vec<f64>,

        #[command(flatten)]
        query: QueryArgs,

        /// Experiment name for an output file (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: Option<String>,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Rank input dimensions by out-of-bag permutation importance
    Importance {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Quantile level in (0, 1) whose loss is measured
        #[arg(long, default_value_t = 0.5)]
        alpha: f64,

        /// Estimation strategy: "cobyla", "sqp", or "inversion"
        #[arg(long, default_value = "inversion")]
        strategy: String,

        /// Weight each tree by its out-of-bag samples only
        #[arg(long, default_value_t = false)]
        restrict_to_oob: bool,

        /// Input column names, comma-separated, for the output
        #[arg(long, value_delimiter = ',')]
        feature_names: Vec<String>,

        /// Experiment name for an output file (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: Option<String>,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct QuantileOutput<'a> {
    n_samples: usize,
    n_trees: usize,
    strategy: String,
    selection: String,
    alphas: &'a [f64],
    queries: &'a [Vec<f64>],
    quantiles: &'a QuantileResult,
}

#[derive(Serialize)]
struct FitOutput {
    model: PathBuf,
    n_samples: usize,
    n_features: usize,
    n_trees: usize,
    feature_names: Vec<String>,
    target: String,
}

#[derive(Serialize)]
struct ImportanceOutput {
    alpha: f64,
    strategy: String,
    n_trees_used: usize,
    features: Vec<FeatureOutput>,
}

#[derive(Serialize)]
struct FeatureOutput {
    name: String,
    importance: f64,
    std: f64,
    rank: usize,
}

fn forest_config(args: &ForestArgs, seed: u64) -> Result<QuantileForestConfig> {
    let leaf_limit = match (args.max_leaf_nodes, args.unlimited_leaves) {
        (Some(n), _) => LeafLimit::Fixed(n),
        (None, true) => LeafLimit::Unlimited,
        (None, false) => LeafLimit::Auto,
    };
    let optim = OptimConfig::new()
        .with_max_iter(args.max_iter)
        .with_tol(args.tol);
    Ok(QuantileForestConfig::new(args.n_trees)
        .context("invalid forest configuration")?
        .with_leaf_limit(leaf_limit)
        .with_min_samples_leaf(args.min_samples_leaf)
        .with_cdf_points(args.cdf_points)
        .with_optim(optim)
        .with_seed(seed))
}

fn parse_strategy(s: &str) -> Result<Strategy> {
    s.parse::<Strategy>()
        .with_context(|| format!("unknown strategy: {s} (expected cobyla, sqp, or inversion)"))
}

fn selection(args: &QueryArgs) -> TreeSelection {
    match (args.tree, args.oob) {
        (Some(tree), true) => TreeSelection::TreeOutOfBag(tree),
        (Some(tree), false) => TreeSelection::Tree(tree),
        (None, _) => TreeSelection::Forest,
    }
}

/// Standard normal draw via the Box-Muller transform.
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn synthetic_linear(n_samples: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let step = if n_samples > 1 {
        5.0 / (n_samples - 1) as f64
    } else {
        0.0
    };
    let inputs: Vec<Vec<f64>> = (0..n_samples).map(|i| vec![i as f64 * step]).collect();
    let outputs = inputs
        .iter()
        .map(|x| 3.0 * x[0] + gaussian(&mut rng))
        .collect();
    (inputs, outputs)
}

fn load_model(path: &Path) -> Result<QuantileForest<RandomForestRegressor>> {
    QuantileForest::load(path).with_context(|| format!("failed to load model {}", path.display()))
}

fn run_query(
    model: &QuantileForest<RandomForestRegressor>,
    queries: Vec<Vec<f64>>,
    args: &QueryArgs,
) -> Result<(QuantileResult, Strategy, TreeSelection)> {
    let strategy = parse_strategy(&args.strategy)?;
    let selection = selection(args);
    let result = model
        .compute_quantile(queries, args.alpha.clone(), strategy, selection)
        .context("quantile estimation failed")?;
    Ok((result, strategy, selection))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Demo {
            n_samples,
            x,
            query,
            forest,
        } => {
            let (inputs, outputs) = synthetic_linear(n_samples, cli.seed);
            info!(n_samples, "generated y = 3x + N(0, 1)");

            let model = forest_config(&forest, cli.seed)?
                .fit(&inputs, &outputs)
                .context("fitting failed")?;
            let queries: Vec<Vec<f64>> = x.iter().map(|&v| vec![v]).collect();
            let (result, strategy, selection) = run_query(&model, queries.clone(), &query)?;

            print_json(&QuantileOutput {
                n_samples: model.n_samples(),
                n_trees: model.n_trees(),
                strategy: strategy.to_string(),
                selection: format!("{selection:?}"),
                alphas: &query.alpha,
                queries: &queries,
                quantiles: &result,
            })?;
        }

        Command::Fit {
            data,
            target,
            model,
            forest,
        } => {
            let reader = match target {
                Some(column) => DatasetReader::new(&data).with_target(column),
                None => DatasetReader::new(&data),
            };
            let dataset = reader
                .read()
                .with_context(|| format!("failed to read {}", data.display()))?;

            let fitted = forest_config(&forest, cli.seed)?
                .fit(dataset.features(), dataset.targets())
                .context("fitting failed")?;
            fitted
                .save(&model)
                .with_context(|| format!("failed to save model to {}", model.display()))?;

            print_json(&FitOutput {
                n_samples: fitted.n_samples(),
                n_features: fitted.n_features(),
                n_trees: fitted.n_trees(),
                feature_names: dataset.feature_names().to_vec(),
                target: dataset.target_name().to_string(),
                model,
            })?;
        }

        Command::Quantile {
            model,
            queries,
            x,
            query,
            experiment,
            output_dir,
        } => {
            let fitted = load_model(&model)?;
            let rows = match queries {
                Some(path) => DatasetReader::new(&path)
                    .read_features()
                    .with_context(|| format!("failed to read {}", path.display()))?
                    .into_rows(),
                None => QueryPoints::from(x)
                    .resolve(fitted.n_features())
                    .context("--x does not fit the model's input width")?,
            };

            let (result, strategy, selection) = run_query(&fitted, rows.clone(), &query)?;

            if let Some(name) = experiment {
                let writer = ResultWriter::new(&output_dir, ExperimentName::new(name)?)?;
                writer.write_quantiles(&rows, &query.alpha, strategy, &result)?;
            }

            print_json(&QuantileOutput {
                n_samples: fitted.n_samples(),
                n_trees: fitted.n_trees(),
                strategy: strategy.to_string(),
                selection: format!("{selection:?}"),
                alphas: &query.alpha,
                queries: &rows,
                quantiles: &result,
            })?;
        }

        Command::Importance {
            model,
            alpha,
            strategy,
            restrict_to_oob,
            feature_names,
            experiment,
            output_dir,
        } => {
            let fitted = load_model(&model)?;
            let strategy = parse_strategy(&strategy)?;
            let config = ImportanceConfig::new()
                .with_strategy(strategy)
                .with_seed(cli.seed)
                .with_n_jobs(cli.threads)
                .with_restrict_to_oob(restrict_to_oob);
            let importance = fitted
                .compute_importance_with(alpha, &config)
                .context("permutation importance failed")?;

            if let Some(name) = experiment {
                let writer = ResultWriter::new(&output_dir, ExperimentName::new(name)?)?;
                writer.write_importance(alpha, strategy, &feature_names, &importance)?;
            }

            let features = importance
                .ranked()
                .into_iter()
                .map(|r| FeatureOutput {
                    name: feature_names
                        .get(r.feature)
                        .cloned()
                        .unwrap_or_else(|| format!("x{}", r.feature)),
                    importance: r.importance,
                    std: r.std,
                    rank: r.rank,
                })
                .collect();
            print_json(&ImportanceOutput {
                alpha,
                strategy: strategy.to_string(),
                n_trees_used: importance.n_trees_used(),
                features,
            })?;
        }
    }

    Ok(())
}
