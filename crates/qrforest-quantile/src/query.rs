//! Query inputs, probability levels, tree selection, and result shapes.

use crate::error::QuantileError;

/// Query covariates as supplied by a caller.
///
/// Resolved once against the fitted dimensionality `d`:
///
/// | Variant | `d == 1` | `d > 1` |
/// |---|---|---|
/// | `Scalar(x)` | one sample | error |
/// | `Flat(v)` | `v.len()` samples | one sample when `v.len() == d` |
/// | `Rows(r)` | rows as given, or one sample from `d` single-value rows | rows as given, or one sample from `d` single-value rows |
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPoints {
    /// A single value.
    Scalar(f64),
    /// A flat sequence of values.
    Flat(Vec<f64>),
    /// Row-major samples.
    Rows(Vec<Vec<f64>>),
}

impl QueryPoints {
    /// Resolve to row-major samples of width `n_features`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::EmptyQuery`] | no values at all |
    /// | [`QuantileError::DimensionMismatch`] | the values cannot be read as samples of width `n_features` |
    pub fn resolve(&self, n_features: usize) -> Result<Vec<Vec<f64>>, QuantileError> {
        let mismatch = |got: usize| QuantileError::DimensionMismatch {
            expected: n_features,
            got,
        };
        match self {
            QueryPoints::Scalar(x) => {
                if n_features == 1 {
                    Ok(vec![vec![*x]])
                } else {
                    Err(mismatch(1))
                }
            }
            QueryPoints::Flat(values) => {
                if values.is_empty() {
                    Err(QuantileError::EmptyQuery)
                } else if n_features == 1 {
                    Ok(values.iter().map(|&x| vec![x]).collect())
                } else if values.len() == n_features {
                    Ok(vec![values.clone()])
                } else {
                    Err(mismatch(values.len()))
                }
            }
            QueryPoints::Rows(rows) => {
                if rows.is_empty() {
                    return Err(QuantileError::EmptyQuery);
                }
                if let Some(bad) = rows.iter().find(|row| row.len() != n_features) {
                    let is_column = rows.len() == n_features && rows.iter().all(|row| row.len() == 1);
                    if is_column {
                        return Ok(vec![rows.iter().map(|row| row[0]).collect()]);
                    }
                    return Err(mismatch(bad.len()));
                }
                Ok(rows.clone())
            }
        }
    }
}

impl From<f64> for QueryPoints {
    fn from(x: f64) -> Self {
        QueryPoints::Scalar(x)
    }
}

impl From<Vec<f64>> for QueryPoints {
    fn from(values: Vec<f64>) -> Self {
        QueryPoints::Flat(values)
    }
}

impl From<&[f64]> for QueryPoints {
    fn from(values: &[f64]) -> Self {
        QueryPoints::Flat(values.to_vec())
    }
}

impl From<Vec<Vec<f64>>> for QueryPoints {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        QueryPoints::Rows(rows)
    }
}

impl From<&[Vec<f64>]> for QueryPoints {
    fn from(rows: &[Vec<f64>]) -> Self {
        QueryPoints::Rows(rows.to_vec())
    }
}

/// One or several probability levels.
#[derive(Debug, Clone, PartialEq)]
pub enum AlphaLevels {
    /// A single level.
    Single(f64),
    /// Several levels, evaluated in order.
    Many(Vec<f64>),
}

impl AlphaLevels {
    /// Validate and return the levels in order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`QuantileError::EmptyAlphaLevels`] | `Many` with no levels |
    /// | [`QuantileError::InvalidAlpha`] | a level outside (0, 1) |
    pub fn resolve(&self) -> Result<Vec<f64>, QuantileError> {
        let levels = match self {
            AlphaLevels::Single(alpha) => vec![*alpha],
            AlphaLevels::Many(levels) if levels.is_empty() => {
                return Err(QuantileError::EmptyAlphaLevels);
            }
            AlphaLevels::Many(levels) => levels.clone(),
        };
        for &alpha in &levels {
            check_alpha(alpha)?;
        }
        Ok(levels)
    }
}

/// Reject levels outside the open unit interval.
pub(crate) fn check_alpha(alpha: f64) -> Result<(), QuantileError> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(QuantileError::InvalidAlpha { alpha })
    }
}

impl From<f64> for AlphaLevels {
    fn from(alpha: f64) -> Self {
        AlphaLevels::Single(alpha)
    }
}

impl From<Vec<f64>> for AlphaLevels {
    fn from(levels: Vec<f64>) -> Self {
        AlphaLevels::Many(levels)
    }
}

impl From<&[f64]> for AlphaLevels {
    fn from(levels: &[f64]) -> Self {
        AlphaLevels::Many(levels.to_vec())
    }
}

/// Which trees contribute to the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeSelection {
    /// Average over every tree.
    #[default]
    Forest,
    /// Tree `i` alone, over the full training set.
    Tree(usize),
    /// Tree `i` alone, over its out-of-bag training samples only.
    TreeOutOfBag(usize),
}

impl TreeSelection {
    /// The selected tree, if a single one.
    #[must_use]
    pub fn tree(self) -> Option<usize> {
        match self {
            TreeSelection::Forest => None,
            TreeSelection::Tree(i) | TreeSelection::TreeOutOfBag(i) => Some(i),
        }
    }
}

/// Quantiles shaped by the query and level counts.
///
/// `n` queries and `m` levels give a scalar when both are one, a vector of
/// length `max(n, m)` when exactly one is, and an `n × m` matrix otherwise.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum QuantileResult {
    /// One query, one level.
    Scalar(f64),
    /// One query and many levels, or many queries and one level.
    Vector(Vec<f64>),
    /// `[query][level]`.
    Matrix(Vec<Vec<f64>>),
}

impl QuantileResult {
    /// Shape an `n × m` table of quantiles.
    #[must_use]
    pub fn from_table(table: Vec<Vec<f64>>) -> Self {
        let n = table.len();
        let m = table.first().map_or(0, Vec::len);
        match (n, m) {
            (1, 1) => QuantileResult::Scalar(table[0][0]),
            (1, _) => QuantileResult::Vector(table.into_iter().flatten().collect()),
            (_, 1) => QuantileResult::Vector(table.into_iter().map(|row| row[0]).collect()),
            _ => QuantileResult::Matrix(table),
        }
    }

    /// All quantiles in row-major order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        match self {
            QuantileResult::Scalar(q) => vec![*q],
            QuantileResult::Vector(v) => v.clone(),
            QuantileResult::Matrix(rows) => rows.iter().flatten().copied().collect(),
        }
    }

    /// The value when the result is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            QuantileResult::Scalar(q) => Some(*q),
            _ => None,
        }
    }
}
