//! Per-dimension discretization of continuous measurements.
//!
//! Cut points start from quantile candidates for equal-probability bins and
//! are then merged down until every bin holds at least the configured
//! minimum number of points. Sparse or constant dimensions therefore
//! degrade to fewer bins instead of failing; every degradation is recorded
//! on the returned cut set and logged.

use crate::config::{AnalysisConfig, CutMode};
use anyhow::{Result, anyhow};
use log::{debug, warn};
use ndarray::{Array2, ArrayView2};
use num_traits::{Float, ToPrimitive};
use statrs::statistics::{Data, OrderStatistics};

/// Cut boundaries for one dimension.
///
/// `boundaries` are strictly increasing inclusive upper edges: a value `v`
/// falls into bin `i` when `boundaries[i-1] < v <= boundaries[i]`, with the
/// outermost bins open-ended. An empty boundary list means the dimension
/// collapsed to a single bin.
#[derive(Debug, Clone)]
pub struct DimensionCuts {
    /// Column index in the sample matrix.
    pub dimension: usize,
    /// Strictly increasing bin edges, `effective_bins() - 1` of them.
    pub boundaries: Vec<f64>,
    /// Bin count the caller asked for.
    pub requested_bins: usize,
    /// Index of the combined group the cuts were pooled over, if any.
    pub shared_group: Option<usize>,
}

impl DimensionCuts {
    /// Number of bins the boundaries actually partition the line into.
    pub fn effective_bins(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Whether sparse data forced fewer bins than requested.
    pub fn is_degraded(&self) -> bool {
        self.effective_bins() < self.requested_bins
    }

    /// Map a value to its 0-based bin index.
    pub fn assign(&self, value: f64) -> u32 {
        self.boundaries.partition_point(|&edge| value > edge) as u32
    }
}

/// The full cut set for a sample matrix, one entry per dimension.
#[derive(Debug, Clone)]
pub struct CutSet {
    pub dims: Vec<DimensionCuts>,
}

impl CutSet {
    pub fn n_dims(&self) -> usize {
        self.dims.len()
    }

    /// Largest effective bin count across dimensions; bounds the curve
    /// coordinate range.
    pub fn max_effective_bins(&self) -> usize {
        self.dims
            .iter()
            .map(DimensionCuts::effective_bins)
            .max()
            .unwrap_or(1)
    }

    /// Dimensions that ended up with fewer bins than requested.
    pub fn degraded_dimensions(&self) -> Vec<usize> {
        self.dims
            .iter()
            .filter(|cuts| cuts.is_degraded())
            .map(|cuts| cuts.dimension)
            .collect()
    }
}

/// Compute cut points for every dimension of `matrix` under `config`.
///
/// In `Combined` mode each listed group shares one cut set computed on the
/// pooled values of its dimensions; dimensions outside every group are cut
/// independently.
pub fn compute_cuts<T>(matrix: ArrayView2<'_, T>, config: &AnalysisConfig) -> Result<CutSet>
where
    T: Float + ToPrimitive,
{
    let n_dims = matrix.ncols();
    if matrix.nrows() == 0 {
        return Err(anyhow!("Cannot compute cuts on an empty sample matrix"));
    }

    let mut dims: Vec<Option<DimensionCuts>> = vec![None; n_dims];

    if let CutMode::Combined { groups } = &config.cut_mode {
        for (group_idx, group) in groups.iter().enumerate() {
            let mut pooled: Vec<f64> = Vec::with_capacity(group.len() * matrix.nrows());
            for &dim in group {
                if dim >= n_dims {
                    return Err(anyhow!(
                        "Combined cut group {group_idx} references dimension {dim} but the matrix has {n_dims}"
                    ));
                }
                pooled.extend(column_values(&matrix, dim));
            }
            let boundaries = cut_values(
                pooled,
                config.n_bins,
                config.min_bin_count,
                &format!("group {group_idx}"),
            );
            for &dim in group {
                dims[dim] = Some(DimensionCuts {
                    dimension: dim,
                    boundaries: boundaries.clone(),
                    requested_bins: config.n_bins,
                    shared_group: Some(group_idx),
                });
            }
        }
    }

    for dim in 0..n_dims {
        if dims[dim].is_none() {
            let boundaries = cut_values(
                column_values(&matrix, dim),
                config.n_bins,
                config.min_bin_count,
                &format!("dimension {dim}"),
            );
            dims[dim] = Some(DimensionCuts {
                dimension: dim,
                boundaries,
                requested_bins: config.n_bins,
                shared_group: None,
            });
        }
    }

    let cut_set = CutSet {
        dims: dims.into_iter().map(|cuts| cuts.unwrap()).collect(),
    };
    for cuts in &cut_set.dims {
        if cuts.is_degraded() {
            warn!(
                "Dimension {} supports only {} of {} requested bins",
                cuts.dimension,
                cuts.effective_bins(),
                cuts.requested_bins
            );
        }
    }
    Ok(cut_set)
}

/// Replace every matrix entry by its 0-based bin index under `cuts`.
pub fn bin_matrix<T>(matrix: ArrayView2<'_, T>, cuts: &CutSet) -> Result<Array2<u32>>
where
    T: Float + ToPrimitive,
{
    if matrix.ncols() != cuts.n_dims() {
        return Err(anyhow!(
            "Cut set covers {} dimensions but the matrix has {}",
            cuts.n_dims(),
            matrix.ncols()
        ));
    }
    let mut binned = Array2::<u32>::zeros((matrix.nrows(), matrix.ncols()));
    for (dim, cut) in cuts.dims.iter().enumerate() {
        for (row, value) in matrix.column(dim).iter().enumerate() {
            binned[[row, dim]] = cut.assign(value.to_f64().unwrap_or(0.0));
        }
    }
    Ok(binned)
}

fn column_values<T>(matrix: &ArrayView2<'_, T>, dim: usize) -> Vec<f64>
where
    T: Float + ToPrimitive,
{
    matrix
        .column(dim)
        .iter()
        .map(|value| value.to_f64().unwrap_or(0.0))
        .collect()
}

/// Quantile-seeded cut points for one value pool, merged down until every
/// bin holds at least `min_count` points or a single bin remains.
fn cut_values(values: Vec<f64>, n_bins: usize, min_count: usize, label: &str) -> Vec<f64> {
    if n_bins <= 1 || values.is_empty() {
        return Vec::new();
    }

    let n_values = values.len();
    let mut data = Data::new(values.clone());
    let mut boundaries: Vec<f64> = Vec::with_capacity(n_bins - 1);
    for k in 1..n_bins {
        let candidate = data.quantile(k as f64 / n_bins as f64);
        // Duplicate quantiles mean the data cannot support the split.
        if boundaries.last().is_none_or(|&last| candidate > last) {
            boundaries.push(candidate);
        }
    }

    // Merge any bin below the count floor into its smaller neighbor.
    loop {
        if boundaries.is_empty() {
            break;
        }
        let counts = bin_counts(&values, &boundaries);
        let Some(sparse) = counts.iter().position(|&count| count < min_count) else {
            break;
        };
        let removed = if sparse == 0 {
            0
        } else if sparse == counts.len() - 1 {
            sparse - 1
        } else if counts[sparse - 1] <= counts[sparse + 1] {
            sparse - 1
        } else {
            sparse
        };
        boundaries.remove(removed);
    }

    debug!(
        "{label}: {} points cut into {} bins ({} requested)",
        n_values,
        boundaries.len() + 1,
        n_bins
    );
    boundaries
}

fn bin_counts(values: &[f64], boundaries: &[f64]) -> Vec<usize> {
    let mut counts = vec![0usize; boundaries.len() + 1];
    for &value in values {
        counts[boundaries.partition_point(|&edge| value > edge)] += 1;
    }
    counts
}
