//! JSON result writer for quantile and importance outputs.

use std::fs;
use std::path::{Path, PathBuf};

use qrforest_quantile::{ImportanceVector, QuantileResult, Strategy};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Writes quantile and importance results to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_quantiles.json` and
/// `{experiment}_importance.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Write quantiles to `{experiment}_quantiles.json` and return the path.
    ///
    /// `result` must come from `queries` and `alphas`; its values are
    /// regrouped per query so every entry lists one quantile per level.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Serialize`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all, fields(n_queries = queries.len(), n_alphas = alphas.len()))]
    pub fn write_quantiles(
        &self,
        queries: &[Vec<f64>],
        alphas: &[f64],
        strategy: Strategy,
        result: &QuantileResult,
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("quantiles");
        let values = result.values();
        let rows: Vec<QueryEntry<'_>> = queries
            .iter()
            .zip(values.chunks(alphas.len().max(1)))
            .map(|(x, quantiles)| QueryEntry { x, quantiles })
            .collect();

        let artifact = QuantileArtifact {
            experiment: self.experiment.as_str(),
            strategy: strategy.to_string(),
            alphas,
            queries: rows,
            result,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "quantile result written");
        Ok(path)
    }

    /// Write permutation importance to `{experiment}_importance.json` and return the path.
    ///
    /// Features are listed by rank, named from `feature_names` when given.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Serialize`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all, fields(alpha = alpha))]
    pub fn write_importance(
        &self,
        alpha: f64,
        strategy: Strategy,
        feature_names: &[String],
        importance: &ImportanceVector,
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("importance");
        let features: Vec<FeatureEntry> = importance
            .ranked()
            .into_iter()
            .map(|r| FeatureEntry {
                name: feature_names
                    .get(r.feature)
                    .cloned()
                    .unwrap_or_else(|| format!("x{}", r.feature)),
                feature: r.feature,
                importance: r.importance,
                std: r.std,
                rank: r.rank,
            })
            .collect();

        let artifact = ImportanceArtifact {
            experiment: self.experiment.as_str(),
            alpha,
            strategy: strategy.to_string(),
            n_trees_used: importance.n_trees_used(),
            features,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "importance result written");
        Ok(path)
    }

    fn artifact_path(&self, kind: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{kind}.json", self.experiment.as_str()))
    }

    fn write_json(&self, path: &Path, artifact: &impl Serialize) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::Serialize {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

// ---------------------------------------------------------------------------
// Artifact shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct QueryEntry<'a> {
    x: &'a [f64],
    quantiles: &'a [f64],
}

#[derive(Serialize)]
struct QuantileArtifact<'a> {
    experiment: &'a str,
    strategy: String,
    alphas: &'a [f64],
    queries: Vec<QueryEntry<'a>>,
    result: &'a QuantileResult,
}

#[derive(Serialize)]
struct FeatureEntry {
    name: String,
    feature: usize,
    importance: f64,
    std: f64,
    rank: usize,
}

#[derive(Serialize)]
struct ImportanceArtifact<'a> {
    experiment: &'a str,
    alpha: f64,
    strategy: String,
    n_trees_used: usize,
    features: Vec<FeatureEntry>,
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn writer(dir: &TempDir, name: &str) -> ResultWriter {
        ResultWriter::new(dir.path(), ExperimentName::new(name.to_string()).unwrap()).unwrap()
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ResultWriter::new(&nested, ExperimentName::new("run".into()).unwrap()).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn quantiles_grouped_per_query() {
        let dir = TempDir::new().unwrap();
        let queries = vec![vec![1.0], vec![2.0]];
        let alphas = [0.1, 0.9];
        let result = QuantileResult::Matrix(vec![vec![0.5, 1.5], vec![1.5, 2.5]]);

        let path = writer(&dir, "qtest")
            .write_quantiles(&queries, &alphas, Strategy::Inversion, &result)
            .unwrap();
        assert_eq!(path, dir.path().join("qtest_quantiles.json"));

        let content = read_json(&path);
        assert_eq!(content["experiment"], "qtest");
        assert_eq!(content["strategy"], "inversion");
        let entries = content["queries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["x"][0].as_f64().unwrap(), 2.0);
        assert_eq!(entries[1]["quantiles"][1].as_f64().unwrap(), 2.5);
        assert_eq!(content["result"][0][0].as_f64().unwrap(), 0.5);
    }

    #[test]
    fn scalar_result_is_a_single_entry() {
        let dir = TempDir::new().unwrap();
        let path = writer(&dir, "one")
            .write_quantiles(
                &[vec![3.0]],
                &[0.9],
                Strategy::default(),
                &QuantileResult::Scalar(10.2),
            )
            .unwrap();
        let content = read_json(&path);
        assert_eq!(content["strategy"], "cobyla");
        assert_eq!(content["result"].as_f64().unwrap(), 10.2);
        assert_eq!(content["queries"][0]["quantiles"][0].as_f64().unwrap(), 10.2);
    }
}
