//! Bootstrap regression forests exposing leaf membership and out-of-bag sets.
//!
//! Trees are CART regressors grown best-first on bootstrap draws, in
//! parallel via rayon. The fitted ensemble answers two questions for
//! downstream estimators: which leaf each tree assigns to a sample, and
//! which training samples each tree never saw.

mod config;
mod error;
mod forest;
mod node;
mod predict;
mod split;
mod tree;

pub use config::{ForestConfig, MaxFeatures};
pub use error::TreeError;
pub use forest::RandomForestRegressor;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use tree::{RegressionTree, RegressionTreeConfig};
