//! Conditional quantiles from random forest leaf weights.
//!
//! A fitted forest acts as a similarity kernel: a query's weight on each
//! training sample is the share of that sample in the query's leaf,
//! averaged over trees. The weighted outputs then give quantiles, either by
//! minimizing the pinball loss under a CDF constraint or by inverting the
//! weighted empirical CDF on a grid. Out-of-bag permutation importance
//! ranks input dimensions by how much the quantile loss grows when each is
//! shuffled.
//!
//! ```no_run
//! use qrforest_quantile::{QuantileForestConfig, Strategy, TreeSelection};
//!
//! # fn main() -> Result<(), qrforest_quantile::QuantileError> {
//! let inputs: Vec<Vec<f64>> = (0..200).map(|i| vec![i as f64 / 40.0]).collect();
//! let outputs: Vec<f64> = inputs.iter().map(|x| 3.0 * x[0]).collect();
//! let model = QuantileForestConfig::new(50)?.fit(&inputs, &outputs)?;
//! let q90 = model.compute_quantile(3.0, 0.9, Strategy::Inversion, TreeSelection::Forest)?;
//! # let _ = q90;
//! # Ok(())
//! # }
//! ```

mod cdf;
mod config;
mod error;
mod executor;
mod forest;
mod importance;
mod loss;
mod model;
mod optim;
mod persist;
mod query;
mod solver;
mod training;
mod weights;

pub use cdf::{CdfGrid, IndicatorMatrix, WeightedCdf};
pub use config::{ImportanceConfig, LeafLimit, QuantileForestConfig, QuantileSettings};
pub use error::QuantileError;
pub use executor::{RayonExecutor, SequentialExecutor, TaskExecutor};
pub use forest::QuantileForest;
pub use importance::{ImportanceVector, RankedFeature};
pub use loss::{mean_pinball_loss, pinball_loss};
pub use model::ForestModel;
pub use optim::{OptimConfig, OptimMethod};
pub use query::{AlphaLevels, QuantileResult, QueryPoints, TreeSelection};
pub use solver::Strategy;
pub use training::{LeafAssignmentMatrix, TrainingIndex, TrainingSet};
