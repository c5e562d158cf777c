//! Candidate-value grid and weighted empirical CDF evaluation.

/// `IndicatorMatrix[i][k] = outputs[i] <= grid[k]`, stored compactly.
///
/// Because the grid is sorted, each row is a step: false up to some column,
/// true from then on. Only that first true column is kept per sample.
#[derive(Debug, Clone)]
pub struct IndicatorMatrix {
    first_covered: Vec<usize>,
    n_grid: usize,
}

impl IndicatorMatrix {
    fn build(outputs: &[f64], grid: &[f64]) -> Self {
        let first_covered = outputs
            .iter()
            .map(|&y| grid.partition_point(|&g| g < y))
            .collect();
        Self {
            first_covered,
            n_grid: grid.len(),
        }
    }

    /// Whether training output `sample` is at most grid value `k`.
    #[must_use]
    pub fn get(&self, sample: usize, k: usize) -> bool {
        self.first_covered[sample] <= k
    }

    /// Number of training samples (rows).
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.first_covered.len()
    }

    /// Number of grid values (columns).
    #[must_use]
    pub fn n_grid(&self) -> usize {
        self.n_grid
    }

    /// Indicator-matrix product with a weight vector: cumulative weight at every grid value.
    ///
    /// Runs in `O(n_grid + n_samples)`.
    #[must_use]
    pub fn weighted_cdf(&self, weights: &[f64]) -> Vec<f64> {
        let mut mass = vec![0.0; self.n_grid + 1];
        for (&k, &w) in self.first_covered.iter().zip(weights) {
            mass[k] += w;
        }
        let mut running = 0.0;
        mass[..self.n_grid]
            .iter()
            .map(|m| {
                running += m;
                running
            })
            .collect()
    }
}

/// Sorted candidate quantile values plus their indicator matrix.
#[derive(Debug, Clone)]
pub struct CdfGrid {
    values: Vec<f64>,
    indicator: IndicatorMatrix,
}

impl CdfGrid {
    /// Build the grid from training outputs.
    ///
    /// `n_points == 0` uses the sorted outputs themselves; otherwise
    /// `n_points` evenly spaced values from the minimum to the maximum output.
    #[must_use]
    pub fn build(outputs: &[f64], n_points: usize) -> Self {
        let values = if n_points == 0 {
            let mut sorted = outputs.to_vec();
            sorted.sort_unstable_by(f64::total_cmp);
            sorted
        } else {
            let lo = outputs.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = outputs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            linspace(lo, hi, n_points)
        };
        let indicator = IndicatorMatrix::build(outputs, &values);
        Self { values, indicator }
    }

    /// Grid values in ascending order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The training-output indicator over this grid.
    #[must_use]
    pub fn indicator(&self) -> &IndicatorMatrix {
        &self.indicator
    }

    /// Number of grid values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the grid has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Weighted CDF of `weights` at every grid value.
    #[must_use]
    pub fn cdf(&self, weights: &[f64]) -> Vec<f64> {
        self.indicator.weighted_cdf(weights)
    }

    /// Smallest grid value whose cumulative weight reaches `alpha`.
    ///
    /// Falls back to the largest grid value when the mass never reaches
    /// `alpha`.
    #[must_use]
    pub fn invert(&self, cdf: &[f64], alpha: f64) -> f64 {
        let k = cdf.partition_point(|&c| c < alpha);
        let k = k.min(self.values.len().saturating_sub(1));
        self.values.get(k).copied().unwrap_or(f64::NAN)
    }
}

/// `n` evenly spaced values from `lo` to `hi`, both inclusive.
fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![lo];
    }
    let step = (hi - lo) / (n - 1) as f64;
    let mut values: Vec<f64> = (0..n).map(|k| lo + step * k as f64).collect();
    values[n - 1] = hi;
    values
}

/// Weighted CDFs of a batch of queries over a shared grid.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WeightedCdf {
    grid: Vec<f64>,
    cdf: Vec<Vec<f64>>,
}

impl WeightedCdf {
    pub(crate) fn new(grid: Vec<f64>, cdf: Vec<Vec<f64>>) -> Self {
        Self { grid, cdf }
    }

    /// Grid values shared by every query.
    #[must_use]
    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    /// CDF of query `k` over [`WeightedCdf::grid`].
    #[must_use]
    pub fn query(&self, k: usize) -> Option<&[f64]> {
        self.cdf.get(k).map(Vec::as_slice)
    }

    /// Number of queries.
    #[must_use]
    pub fn n_queries(&self) -> usize {
        self.cdf.len()
    }
}
