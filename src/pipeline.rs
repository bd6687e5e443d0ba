//! End-to-end orchestration: sanitize the sample matrix, cut and bin every
//! dimension, order dimensions by mutual information, encode each point
//! onto the Hilbert curve, and tabulate the per-index populations.
//!
//! The returned artifacts are everything external reporting consumes; the
//! similarity scores and the bootstrap run on top of them.

use crate::binning::{self, CutSet};
use crate::bootstrap::{self, BootstrapResult};
use crate::config::AnalysisConfig;
use crate::curve::HilbertEncoder;
use crate::ordering::{self, DimensionOrdering};
use crate::similarity::{self, CountTable};
use anyhow::{Result, anyhow};
use log::info;
use ndarray::{Array2, ArrayView2, Axis};
use num_traits::{Float, ToPrimitive};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// Everything the pipeline derives from one dataset.
#[derive(Debug, Clone)]
pub struct AnalysisArtifacts {
    /// Per-dimension cut points, with effective bin counts for every
    /// degraded dimension.
    pub cuts: CutSet,
    /// Mutual-information distances and the interleave permutation.
    pub ordering: DimensionOrdering,
    /// One curve position per input point, in input order.
    pub indices: Vec<u128>,
    /// Per-index, per-condition population counts.
    pub table: CountTable,
    config: AnalysisConfig,
}

impl AnalysisArtifacts {
    /// Pairwise Jensen-Shannon divergence between all conditions.
    pub fn similarity_matrix(&self) -> Result<Array2<f64>> {
        similarity::pairwise_jensen_shannon(&self.table)
    }

    /// Run the bootstrap significance test against `reference`.
    pub fn bootstrap(&self, reference: &str) -> Result<BootstrapResult> {
        bootstrap::bootstrap_significance(&self.table, reference, &self.config)
    }
}

/// The full transformation pipeline under one explicit configuration.
#[derive(Debug, Clone)]
pub struct SimilarityPipeline {
    config: AnalysisConfig,
}

impl SimilarityPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        SimilarityPipeline { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Transform a sample matrix (points x dimensions) with one condition
    /// label per point into curve positions and population tables.
    pub fn run<T>(&self, samples: ArrayView2<'_, T>, labels: &[String]) -> Result<AnalysisArtifacts>
    where
        T: Float + ToPrimitive,
    {
        let n_points = samples.nrows();
        let n_dims = samples.ncols();
        self.config.validate(n_dims)?;
        if labels.len() != n_points {
            return Err(anyhow!(
                "{n_points} sample points but {} condition labels",
                labels.len()
            ));
        }
        if n_points == 0 {
            return Err(anyhow!("Sample matrix has no points"));
        }
        let mut distinct: Vec<&String> = labels.iter().collect();
        distinct.sort();
        distinct.dedup();
        if distinct.len() < 2 {
            return Err(anyhow!(
                "At least two condition labels are required, got {}",
                distinct.len()
            ));
        }

        let matrix = sanitize(samples)?;
        info!("Pipeline: {n_points} points, {n_dims} dimensions, {} conditions", distinct.len());

        let cuts = binning::compute_cuts(matrix.view(), &self.config)?;
        let binned = binning::bin_matrix(matrix.view(), &cuts)?;
        let ordering = ordering::order_dimensions(binned.view())?;
        info!("Pipeline: interleave order {:?}", ordering.permutation);

        let encoder = HilbertEncoder::with_permutation(
            n_dims,
            self.config.curve_order,
            ordering.permutation.clone(),
        )?;
        let rows: Vec<Vec<u32>> = binned
            .axis_iter(Axis(0))
            .map(|row| row.to_vec())
            .collect();
        let indices: Vec<u128> = rows
            .into_par_iter()
            .map(|coords| encoder.encode(&coords))
            .collect::<Result<Vec<_>>>()?;

        let table = CountTable::from_labeled_indices(&indices, labels)?;
        info!("Pipeline: {} populated curve positions", table.n_rows());

        Ok(AnalysisArtifacts {
            cuts,
            ordering,
            indices,
            table,
            config: self.config.clone(),
        })
    }
}

/// Clamp negative intensities to zero and reject non-finite entries.
fn sanitize<T>(samples: ArrayView2<'_, T>) -> Result<Array2<f64>>
where
    T: Float + ToPrimitive,
{
    let mut matrix = Array2::<f64>::zeros(samples.raw_dim());
    for ((row, col), value) in samples.indexed_iter() {
        let value = value.to_f64().unwrap_or(f64::NAN);
        if !value.is_finite() {
            return Err(anyhow!(
                "Non-finite measurement at point {row}, dimension {col}"
            ));
        }
        matrix[[row, col]] = value.max(0.0);
    }
    Ok(matrix)
}
