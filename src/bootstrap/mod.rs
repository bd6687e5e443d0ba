//! Bootstrap significance testing of per-index population differences.
//!
//! Each repetition redraws an equal number of points per condition from the
//! restricted population, recomputes per-index fold changes against the
//! reference condition, and records the sign of the change. Indices whose
//! sign count exceeds the significance proportion of repetitions are
//! declared changed. Repetitions are independent and run in parallel, each
//! on its own seeded random stream, so a fixed seed reproduces the run
//! exactly regardless of scheduling.

use crate::config::AnalysisConfig;
use crate::similarity::CountTable;
use anyhow::{Result, anyhow};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// Per-repetition sign counts for one (index, condition) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignTally {
    pub decreased: u32,
    pub unchanged: u32,
    pub increased: u32,
}

impl SignTally {
    fn record(&mut self, sign: i8) {
        match sign {
            -1 => self.decreased += 1,
            1 => self.increased += 1,
            _ => self.unchanged += 1,
        }
    }

    fn merge(&mut self, other: &SignTally) {
        self.decreased += other.decreased;
        self.unchanged += other.unchanged;
        self.increased += other.increased;
    }

    /// Total repetitions recorded; equals the repetition count for every
    /// cell of a completed run.
    pub fn total(&self) -> u32 {
        self.decreased + self.unchanged + self.increased
    }
}

/// Outcome for one (index, condition) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Decreased,
    NotSignificant,
    Increased,
}

/// Accumulated sign counts for all restricted indices and non-reference
/// conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapResult {
    /// Reference condition label.
    pub reference: String,
    /// Non-reference conditions, in count-table order.
    pub conditions: Vec<String>,
    /// Restricted curve positions (total count >= the population floor),
    /// ascending.
    pub indices: Vec<u128>,
    /// `tallies[row][condition]`, aligned with `indices` and `conditions`.
    pub tallies: Vec<Vec<SignTally>>,
    /// Common per-condition sample size drawn each repetition.
    pub sample_size: u64,
    /// Number of repetitions accumulated.
    pub n_repetitions: u32,
    /// Significance proportion the verdicts are computed against.
    pub significance: f64,
    /// Base seed the repetition streams were derived from.
    pub seed: u64,
}

impl BootstrapResult {
    /// Verdict for one cell: a sign bucket must strictly exceed
    /// `n_repetitions * significance`.
    pub fn verdict(&self, row: usize, condition: usize) -> Verdict {
        let tally = &self.tallies[row][condition];
        let floor = f64::from(self.n_repetitions) * self.significance;
        if f64::from(tally.decreased) > floor {
            Verdict::Decreased
        } else if f64::from(tally.increased) > floor {
            Verdict::Increased
        } else {
            Verdict::NotSignificant
        }
    }

    pub fn tally(&self, index: u128, condition: &str) -> Option<&SignTally> {
        let row = self.indices.binary_search(&index).ok()?;
        let cond = self.conditions.iter().position(|c| c == condition)?;
        Some(&self.tallies[row][cond])
    }

    /// Every cell with a significant verdict.
    pub fn significant(&self) -> Vec<(u128, &str, Verdict)> {
        let mut flagged = Vec::new();
        for (row, &index) in self.indices.iter().enumerate() {
            for (cond, condition) in self.conditions.iter().enumerate() {
                let verdict = self.verdict(row, cond);
                if verdict != Verdict::NotSignificant {
                    flagged.push((index, condition.as_str(), verdict));
                }
            }
        }
        flagged
    }
}

/// Classify one repetition's log2 fold change of `test` against
/// `reference` as -1 (decreased), 0 (unchanged), or +1 (increased).
///
/// A zero test count is a maximal decrease rather than an undefined ratio:
/// total absence of a population is itself the strongest possible change.
/// This also covers the 0/0 cell. A zero reference count with a nonzero
/// test count is the mirror case, a maximal increase.
pub fn classify_fold_change(test: u64, reference: u64, log2_threshold: f64) -> i8 {
    if test == 0 {
        return -1;
    }
    if reference == 0 {
        return 1;
    }
    let fold = (test as f64 / reference as f64).log2();
    if fold <= -log2_threshold {
        -1
    } else if fold >= log2_threshold {
        1
    } else {
        0
    }
}

/// Round `value` down to the nearest multiple of `granularity`.
fn round_down(value: u64, granularity: u64) -> u64 {
    value / granularity * granularity
}

/// Run the bootstrap against `reference` over all other conditions in the
/// table.
pub fn bootstrap_significance(
    table: &CountTable,
    reference: &str,
    config: &AnalysisConfig,
) -> Result<BootstrapResult> {
    if table.n_conditions() < 2 {
        return Err(anyhow!(
            "Bootstrap needs at least two conditions, got {}",
            table.n_conditions()
        ));
    }
    let reference_idx = table
        .condition_index(reference)
        .ok_or_else(|| anyhow!("Reference condition {reference:?} not present in the table"))?;
    if config.n_repetitions == 0 {
        return Err(anyhow!("Bootstrap repetition count must be positive"));
    }

    // Step 1: restrict to indices with enough total population.
    let mut indices: Vec<u128> = Vec::new();
    let mut counts: Vec<Vec<u64>> = vec![Vec::new(); table.n_conditions()];
    for (index, row) in table.rows() {
        if row.iter().sum::<u64>() >= config.min_index_count {
            indices.push(index);
            for (condition, &count) in row.iter().enumerate() {
                counts[condition].push(count);
            }
        }
    }
    if indices.is_empty() {
        return Err(anyhow!(
            "No curve position reaches the population floor of {}",
            config.min_index_count
        ));
    }

    // Step 2: equalize sample size across conditions, rounded down to the
    // caller's granularity.
    let restricted_totals: Vec<u64> = counts.iter().map(|c| c.iter().sum()).collect();
    let smallest = *restricted_totals.iter().min().unwrap_or(&0);
    let sample_size = round_down(smallest, config.granularity);
    if sample_size == 0 {
        return Err(anyhow!(
            "Smallest restricted condition holds {smallest} points, below the rounding granularity {}",
            config.granularity
        ));
    }

    let cumulative: Vec<Vec<u64>> = counts
        .iter()
        .map(|condition_counts| {
            condition_counts
                .iter()
                .scan(0u64, |acc, &count| {
                    *acc += count;
                    Some(*acc)
                })
                .collect()
        })
        .collect();

    let non_reference: Vec<usize> = (0..table.n_conditions())
        .filter(|&condition| condition != reference_idx)
        .collect();
    let log2_threshold = config.fold_threshold.log2();
    let seed = config.seed.unwrap_or_else(rand::random);
    let n_rows = indices.len();
    let n_cells = n_rows * non_reference.len();

    info!(
        "Bootstrap: {} repetitions of {} points over {} indices and {} test conditions",
        config.n_repetitions,
        sample_size,
        n_rows,
        non_reference.len()
    );

    // Steps 3-5: independent repetitions, merged by associative addition.
    let flat: Vec<SignTally> = (0..config.n_repetitions)
        .into_par_iter()
        .map(|repetition| {
            let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(u64::from(repetition)));
            let draws: Vec<Vec<u64>> = cumulative
                .iter()
                .zip(restricted_totals.iter())
                .map(|(cumulative_counts, &total)| {
                    draw_with_replacement(&mut rng, cumulative_counts, total, sample_size)
                })
                .collect();

            let mut local = vec![SignTally::default(); n_cells];
            for (slot, &condition) in non_reference.iter().enumerate() {
                for row in 0..n_rows {
                    let sign = classify_fold_change(
                        draws[condition][row],
                        draws[reference_idx][row],
                        log2_threshold,
                    );
                    local[row * non_reference.len() + slot].record(sign);
                }
            }
            local
        })
        .reduce(
            || vec![SignTally::default(); n_cells],
            |mut left, right| {
                for (cell, other) in left.iter_mut().zip(right.iter()) {
                    cell.merge(other);
                }
                left
            },
        );

    let tallies: Vec<Vec<SignTally>> = flat
        .chunks(non_reference.len())
        .map(<[SignTally]>::to_vec)
        .collect();
    debug!("Bootstrap accumulation complete over {n_cells} cells");

    Ok(BootstrapResult {
        reference: reference.to_string(),
        conditions: non_reference
            .iter()
            .map(|&condition| table.conditions()[condition].clone())
            .collect(),
        indices,
        tallies,
        sample_size,
        n_repetitions: config.n_repetitions,
        significance: config.significance,
        seed,
    })
}

/// Draw `sample_size` points with replacement from a population given by
/// cumulative per-index counts, returning the per-index draw counts.
fn draw_with_replacement(
    rng: &mut SmallRng,
    cumulative: &[u64],
    total: u64,
    sample_size: u64,
) -> Vec<u64> {
    let mut drawn = vec![0u64; cumulative.len()];
    for _ in 0..sample_size {
        let pick = rng.random_range(0..total);
        let row = cumulative.partition_point(|&upper| upper <= pick);
        drawn[row] += 1;
    }
    drawn
}
