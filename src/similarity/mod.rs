//! Population tables over curve positions and the information-theoretic
//! similarity scores computed from them.

use anyhow::{Result, anyhow};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Per-index, per-condition point counts.
///
/// Rows are keyed by curve position; only positions observed in at least
/// one condition appear. Conditions keep their order of first appearance,
/// so iteration is deterministic end to end.
#[derive(Debug, Clone)]
pub struct CountTable {
    conditions: Vec<String>,
    rows: BTreeMap<u128, Vec<u64>>,
    totals: Vec<u64>,
}

impl CountTable {
    /// Build a table from one curve position and one condition label per
    /// point.
    pub fn from_labeled_indices(indices: &[u128], labels: &[String]) -> Result<Self> {
        if indices.len() != labels.len() {
            return Err(anyhow!(
                "{} curve positions but {} condition labels",
                indices.len(),
                labels.len()
            ));
        }
        if indices.is_empty() {
            return Err(anyhow!("Cannot build a count table from zero points"));
        }

        let mut conditions: Vec<String> = Vec::new();
        let mut rows: BTreeMap<u128, Vec<u64>> = BTreeMap::new();
        for (&index, label) in indices.iter().zip(labels.iter()) {
            let condition = match conditions.iter().position(|c| c == label) {
                Some(position) => position,
                None => {
                    conditions.push(label.clone());
                    for row in rows.values_mut() {
                        row.push(0);
                    }
                    conditions.len() - 1
                }
            };
            rows.entry(index)
                .or_insert_with(|| vec![0; conditions.len()])[condition] += 1;
        }

        let mut totals = vec![0u64; conditions.len()];
        for row in rows.values() {
            for (condition, &count) in row.iter().enumerate() {
                totals[condition] += count;
            }
        }
        Ok(CountTable {
            conditions,
            rows,
            totals,
        })
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn n_conditions(&self) -> usize {
        self.conditions.len()
    }

    pub fn condition_index(&self, label: &str) -> Option<usize> {
        self.conditions.iter().position(|c| c == label)
    }

    /// Total point count per condition.
    pub fn totals(&self) -> &[u64] {
        &self.totals
    }

    /// Counts for one curve position, one entry per condition.
    pub fn counts(&self, index: u128) -> Option<&[u64]> {
        self.rows.get(&index).map(Vec::as_slice)
    }

    /// All populated curve positions with their per-condition counts, in
    /// ascending position order.
    pub fn rows(&self) -> impl Iterator<Item = (u128, &[u64])> {
        self.rows.iter().map(|(&index, row)| (index, row.as_slice()))
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

/// Pairwise Jensen-Shannon divergence between the index distributions of
/// all conditions, as a symmetric condition-by-condition matrix.
///
/// Base-2 logarithms, so every entry is in [0, 1]; an index absent from one
/// condition contributes zero probability there, not an undefined value.
pub fn pairwise_jensen_shannon(table: &CountTable) -> Result<Array2<f64>> {
    let k = table.n_conditions();
    if table.totals().iter().any(|&total| total == 0) {
        return Err(anyhow!("Every condition needs at least one point"));
    }
    let mut matrix = Array2::<f64>::zeros((k, k));
    for a in 0..k {
        for b in (a + 1)..k {
            let divergence = jensen_shannon(table, a, b);
            matrix[[a, b]] = divergence;
            matrix[[b, a]] = divergence;
        }
    }
    Ok(matrix)
}

fn jensen_shannon(table: &CountTable, a: usize, b: usize) -> f64 {
    let total_a = table.totals()[a] as f64;
    let total_b = table.totals()[b] as f64;
    let mut divergence = 0.0;
    for (_, row) in table.rows() {
        let p = row[a] as f64 / total_a;
        let q = row[b] as f64 / total_b;
        let mid = 0.5 * (p + q);
        if p > 0.0 {
            divergence += 0.5 * p * (p / mid).log2();
        }
        if q > 0.0 {
            divergence += 0.5 * q * (q / mid).log2();
        }
    }
    divergence.clamp(0.0, 1.0)
}

/// Shannon entropy (bits) of one condition's index distribution, the
/// complexity descriptor reported next to the divergence scores.
pub fn condition_entropy(table: &CountTable, condition: usize) -> Result<f64> {
    if condition >= table.n_conditions() {
        return Err(anyhow!(
            "Condition {} out of range for a table with {}",
            condition,
            table.n_conditions()
        ));
    }
    let total = table.totals()[condition] as f64;
    if total == 0.0 {
        return Err(anyhow!(
            "Condition {:?} has no points",
            table.conditions()[condition]
        ));
    }
    let mut entropy = 0.0;
    for (_, row) in table.rows() {
        let p = row[condition] as f64 / total;
        if p > 0.0 {
            entropy -= p * p.log2();
        }
    }
    Ok(entropy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn labels(spec: &[(&str, usize)]) -> Vec<String> {
        spec.iter()
            .flat_map(|&(name, count)| std::iter::repeat_n(name.to_string(), count))
            .collect()
    }

    #[test]
    fn counts_and_totals_accumulate() {
        let indices = vec![5u128, 5, 9, 5, 9, 42];
        let labels = labels(&[("ctrl", 3), ("stim", 3)]);
        let table = CountTable::from_labeled_indices(&indices, &labels).unwrap();
        assert_eq!(table.conditions(), &["ctrl".to_string(), "stim".to_string()]);
        assert_eq!(table.counts(5).unwrap(), &[2, 1]);
        assert_eq!(table.counts(9).unwrap(), &[1, 1]);
        assert_eq!(table.counts(42).unwrap(), &[0, 1]);
        assert_eq!(table.counts(7), None);
        assert_eq!(table.totals(), &[3, 3]);
    }

    #[test]
    fn identical_distributions_have_zero_divergence() {
        let indices = vec![1u128, 2, 3, 1, 2, 3];
        let labels = labels(&[("a", 3), ("b", 3)]);
        let table = CountTable::from_labeled_indices(&indices, &labels).unwrap();
        let matrix = pairwise_jensen_shannon(&table).unwrap();
        assert_relative_eq!(matrix[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn disjoint_distributions_have_maximal_divergence() {
        let indices = vec![1u128, 2, 10, 20];
        let labels = labels(&[("a", 2), ("b", 2)]);
        let table = CountTable::from_labeled_indices(&indices, &labels).unwrap();
        let matrix = pairwise_jensen_shannon(&table).unwrap();
        assert_relative_eq!(matrix[[0, 1]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(matrix[[1, 0]], matrix[[0, 1]]);
    }

    #[test]
    fn uniform_entropy_is_log2_of_support() {
        let indices = vec![1u128, 2, 3, 4];
        let labels = labels(&[("a", 4)]);
        let table = CountTable::from_labeled_indices(&indices, &labels).unwrap();
        assert_relative_eq!(condition_entropy(&table, 0).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn shape_mismatch_rejected() {
        let indices = vec![1u128, 2];
        let labels = labels(&[("a", 3)]);
        assert!(CountTable::from_labeled_indices(&indices, &labels).is_err());
    }
}
