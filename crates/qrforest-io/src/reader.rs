//! CSV dataset reader with full input validation.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{Dataset, FeatureTable};

/// Reads numeric tables from a headered CSV file.
///
/// Every column is numeric. [`DatasetReader::read`] sets one column aside
/// as the response (the last column unless [`DatasetReader::with_target`]
/// names another); [`DatasetReader::read_features`] keeps all columns as
/// inputs, for query files.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::NoFeatureColumns`] | No input column in the header |
/// | [`IoError::MissingTargetColumn`] | Named target not in the header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Cell is NaN, Inf, or unparseable float |
pub struct DatasetReader {
    path: PathBuf,
    target: Option<String>,
}

impl DatasetReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            target: None,
        }
    }

    /// Use the named column as the response.
    #[must_use]
    pub fn with_target(mut self, column: impl Into<String>) -> Self {
        self.target = Some(column.into());
        self
    }

    /// Read a training dataset.
    #[instrument(skip(self), fields(path = %self.path.display(), target = ?self.target))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let (header, rows) = self.read_table()?;

        let target_index = match &self.target {
            Some(column) => header.iter().position(|h| h == column).ok_or_else(|| {
                IoError::MissingTargetColumn {
                    path: self.path.clone(),
                    column: column.clone(),
                }
            })?,
            None => header.len() - 1,
        };
        if header.len() < 2 {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }

        let mut feature_names = header;
        let target_name = feature_names.remove(target_index);
        let (features, targets): (Vec<Vec<f64>>, Vec<f64>) = rows
            .into_iter()
            .map(|mut row| {
                let y = row.remove(target_index);
                (row, y)
            })
            .unzip();

        info!(
            n_samples = targets.len(),
            n_features = feature_names.len(),
            target = %target_name,
            "dataset loaded"
        );
        Ok(Dataset::new(feature_names, target_name, features, targets))
    }

    /// Read every column as an input, without a response.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_features(&self) -> Result<FeatureTable, IoError> {
        let (header, rows) = self.read_table()?;
        info!(n_rows = rows.len(), n_features = header.len(), "feature table loaded");
        Ok(FeatureTable::new(header, rows))
    }

    /// Parse the header and all rows as finite floats.
    fn read_table(&self) -> Result<(Vec<String>, Vec<Vec<f64>>), IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // Flexible so the row-length check below reports the row instead of
        // a bare parse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header: Vec<String> = rdr
            .headers()
            .map_err(|e| self.parse_error(e))?
            .iter()
            .map(String::from)
            .collect();
        if header.is_empty() || header.iter().all(String::is_empty) {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let expected = header.len();
        debug!(expected, "read CSV header");

        let mut rows = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.parse_error(e))?;
            if record.len() != expected {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected,
                    got: record.len(),
                });
            }

            let row = record
                .iter()
                .zip(&header)
                .map(|(raw, column)| match raw.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(IoError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index,
                        column: column.clone(),
                        raw: raw.to_string(),
                    }),
                })
                .collect::<Result<Vec<f64>, IoError>>()?;
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }
        Ok((header, rows))
    }

    fn parse_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}
