use anyhow::{Result, anyhow};

/// How per-dimension cut points are generated.
#[derive(Debug, Clone, PartialEq)]
pub enum CutMode {
    /// Each dimension gets its own cut set computed from its own values.
    Independent,
    /// Each listed group of dimensions shares one cut set computed on the
    /// pooled values of the group. Dimensions not covered by any group fall
    /// back to independent cuts. A dimension may appear in at most one group.
    Combined { groups: Vec<Vec<usize>> },
}

/// Analysis parameters threaded explicitly through every pipeline stage.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Requested number of bins per dimension.
    pub n_bins: usize,
    /// Minimum number of points per bin; under-populated bins are merged
    /// with a neighbor and the effective bin count drops.
    pub min_bin_count: usize,
    /// Cutting mode (independent per dimension or pooled across groups).
    pub cut_mode: CutMode,
    /// Hilbert curve order: bits per dimension. Must satisfy
    /// `2^order >= n_bins` and `order * n_dims <= 128`.
    pub curve_order: u32,
    /// Minimum total count (across conditions) for a Hilbert index to enter
    /// the bootstrap.
    pub min_index_count: u64,
    /// Number of bootstrap repetitions.
    pub n_repetitions: u32,
    /// Fold-change threshold on the linear scale (e.g. 2.0 means a
    /// repetition counts as changed when |log2 fold| >= 1).
    pub fold_threshold: f64,
    /// Fraction of repetitions a sign must exceed for significance.
    pub significance: f64,
    /// Rounding granularity for the common bootstrap sample size.
    pub granularity: u64,
    /// Seed for the bootstrap random streams. `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            n_bins: 8,
            min_bin_count: 40,
            cut_mode: CutMode::Independent,
            curve_order: 3,
            min_index_count: 40,
            n_repetitions: 400,
            fold_threshold: 2.0,
            significance: 0.95,
            granularity: 1000,
            seed: None,
        }
    }
}

impl AnalysisConfig {
    /// Validate the parameter combination against a dataset with `n_dims`
    /// dimensions. Structural problems abort the run here, before any
    /// computation starts.
    pub fn validate(&self, n_dims: usize) -> Result<()> {
        if n_dims == 0 {
            return Err(anyhow!("Sample matrix has zero dimensions"));
        }
        if self.n_bins < 1 {
            return Err(anyhow!("Requested bin count must be at least 1"));
        }
        if self.curve_order == 0 || self.curve_order > 32 {
            return Err(anyhow!(
                "Curve order must be in 1..=32, got {}",
                self.curve_order
            ));
        }
        let capacity = 1u64 << self.curve_order;
        if (self.n_bins as u64) > capacity {
            return Err(anyhow!(
                "Curve order {} addresses only {} bins per dimension, but {} were requested",
                self.curve_order,
                capacity,
                self.n_bins
            ));
        }
        if self.curve_order as usize * n_dims > 128 {
            return Err(anyhow!(
                "Curve order {} with {} dimensions exceeds the 128-bit index space",
                self.curve_order,
                n_dims
            ));
        }
        if self.n_repetitions == 0 {
            return Err(anyhow!("Bootstrap repetition count must be positive"));
        }
        if self.fold_threshold < 1.0 || !self.fold_threshold.is_finite() {
            return Err(anyhow!(
                "Fold-change threshold must be a finite value >= 1, got {}",
                self.fold_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.significance) {
            return Err(anyhow!(
                "Significance proportion must be in [0, 1], got {}",
                self.significance
            ));
        }
        if self.granularity == 0 {
            return Err(anyhow!("Rounding granularity must be positive"));
        }
        if let CutMode::Combined { groups } = &self.cut_mode {
            let mut seen = vec![false; n_dims];
            for group in groups {
                if group.is_empty() {
                    return Err(anyhow!("Combined cut groups cannot be empty"));
                }
                for &dim in group {
                    if dim >= n_dims {
                        return Err(anyhow!(
                            "Combined cut group references dimension {} but the data has {}",
                            dim,
                            n_dims
                        ));
                    }
                    if seen[dim] {
                        return Err(anyhow!(
                            "Dimension {} appears in more than one combined cut group",
                            dim
                        ));
                    }
                    seen[dim] = true;
                }
            }
        }
        Ok(())
    }
}
