//! CSV datasets and JSON result artifacts for the qrforest pipeline.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{Dataset, ExperimentName, FeatureTable};
pub use error::IoError;
pub use reader::DatasetReader;
pub use writer::ResultWriter;
