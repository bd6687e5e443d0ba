//! Dimension ordering for the curve interleave.
//!
//! Pairwise normalized mutual information between binned dimensions is
//! treated as a dissimilarity (0 = fully dependent, 1 = fully independent)
//! and fed to average-linkage agglomerative clustering; the dendrogram leaf
//! order becomes the interleave permutation. Placing dependent channels on
//! neighboring curve axes improves how much structure the curve preserves;
//! it never changes the binned values themselves.

use anyhow::{Result, anyhow};
use ndarray::{Array2, ArrayView2};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::collections::HashMap;

/// The pairwise dissimilarity matrix and the leaf order derived from it.
#[derive(Debug, Clone)]
pub struct DimensionOrdering {
    /// Symmetric matrix of `1 - MI/H_joint`, diagonal fixed at 0.
    pub distance: Array2<f64>,
    /// Permutation of dimension indices; `permutation[axis]` is the input
    /// dimension interleaved at that curve axis.
    pub permutation: Vec<usize>,
}

/// Compute the dissimilarity matrix for a binned matrix and cluster it into
/// an interleave order.
pub fn order_dimensions(binned: ArrayView2<'_, u32>) -> Result<DimensionOrdering> {
    if binned.nrows() == 0 || binned.ncols() == 0 {
        return Err(anyhow!("Cannot order dimensions of an empty matrix"));
    }
    let distance = mutual_information_matrix(binned);
    let permutation = leaf_order(&distance);
    Ok(DimensionOrdering {
        distance,
        permutation,
    })
}

/// Symmetric matrix of normalized mutual information dissimilarities,
/// `1 - MI(i,j)/H(i,j)` over the joint empirical bin distribution.
///
/// A pair with zero joint entropy (both dimensions constant) carries no
/// information either way and is fixed at the maximal dissimilarity 1.0
/// instead of propagating 0/0.
pub fn mutual_information_matrix(binned: ArrayView2<'_, u32>) -> Array2<f64> {
    let n_dims = binned.ncols();
    let pairs: Vec<(usize, usize)> = (0..n_dims)
        .flat_map(|i| ((i + 1)..n_dims).map(move |j| (i, j)))
        .collect();

    let columns: Vec<Vec<u32>> = (0..n_dims).map(|dim| binned.column(dim).to_vec()).collect();
    let cells: Vec<(usize, usize, f64)> = pairs
        .into_par_iter()
        .map(|(i, j)| (i, j, pair_dissimilarity(&columns[i], &columns[j])))
        .collect();

    let mut matrix = Array2::<f64>::zeros((n_dims, n_dims));
    for (i, j, d) in cells {
        matrix[[i, j]] = d;
        matrix[[j, i]] = d;
    }
    matrix
}

fn pair_dissimilarity(a: &[u32], b: &[u32]) -> f64 {
    let n = a.len() as f64;
    let mut joint: HashMap<(u32, u32), u64> = HashMap::new();
    let mut left: HashMap<u32, u64> = HashMap::new();
    let mut right: HashMap<u32, u64> = HashMap::new();
    for (&x, &y) in a.iter().zip(b.iter()) {
        *joint.entry((x, y)).or_insert(0) += 1;
        *left.entry(x).or_insert(0) += 1;
        *right.entry(y).or_insert(0) += 1;
    }

    let mut mutual_information = 0.0;
    let mut joint_entropy = 0.0;
    for (&(x, y), &count) in &joint {
        let p_xy = count as f64 / n;
        let p_x = left[&x] as f64 / n;
        let p_y = right[&y] as f64 / n;
        mutual_information += p_xy * (p_xy / (p_x * p_y)).ln();
        joint_entropy -= p_xy * p_xy.ln();
    }

    if joint_entropy <= 0.0 {
        return 1.0;
    }
    (1.0 - mutual_information / joint_entropy).clamp(0.0, 1.0)
}

/// Average-linkage agglomeration over a dissimilarity matrix; returns the
/// dendrogram leaf order. The closest active pair merges first, ties broken
/// toward the lowest indices, so the result is stable across runs.
fn leaf_order(distance: &Array2<f64>) -> Vec<usize> {
    let n = distance.nrows();
    if n <= 1 {
        return (0..n).collect();
    }

    let mut leaves: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut sizes: Vec<usize> = vec![1; n];
    let mut active: Vec<bool> = vec![true; n];
    let mut dist = distance.clone();

    for _ in 1..n {
        let mut best: Option<(usize, usize)> = None;
        let mut best_distance = f64::INFINITY;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if active[j] && dist[[i, j]] < best_distance {
                    best_distance = dist[[i, j]];
                    best = Some((i, j));
                }
            }
        }
        let Some((i, j)) = best else { break };

        // Lance-Williams update for average linkage: merge j into i.
        for k in 0..n {
            if k != i && k != j && active[k] {
                let merged = (sizes[i] as f64 * dist[[i, k]] + sizes[j] as f64 * dist[[j, k]])
                    / (sizes[i] + sizes[j]) as f64;
                dist[[i, k]] = merged;
                dist[[k, i]] = merged;
            }
        }
        let trailing = std::mem::take(&mut leaves[j]);
        leaves[i].extend(trailing);
        sizes[i] += sizes[j];
        active[j] = false;
    }

    let root = (0..n).find(|&i| active[i]).unwrap_or(0);
    leaves[root].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// Four dimensions: 0 and 2 are identical, 1 is a noisy shuffle, 3 is
    /// constant.
    fn binned_fixture() -> Array2<u32> {
        let n = 240;
        Array2::from_shape_fn((n, 4), |(row, col)| match col {
            0 => (row % 6) as u32,
            1 => ((row * 7 + 3) % 5) as u32,
            2 => (row % 6) as u32,
            _ => 0,
        })
    }

    #[test]
    fn matrix_is_symmetric_and_finite() {
        let matrix = mutual_information_matrix(binned_fixture().view());
        for i in 0..4 {
            assert_relative_eq!(matrix[[i, i]], 0.0);
            for j in 0..4 {
                assert!(matrix[[i, j]].is_finite());
                assert!((0.0..=1.0).contains(&matrix[[i, j]]));
                assert_relative_eq!(matrix[[i, j]], matrix[[j, i]]);
            }
        }
    }

    #[test]
    fn identical_dimensions_are_fully_dependent() {
        let matrix = mutual_information_matrix(binned_fixture().view());
        assert_relative_eq!(matrix[[0, 2]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_dimension_is_maximally_dissimilar() {
        let matrix = mutual_information_matrix(binned_fixture().view());
        // Zero marginal entropy on one side: MI is 0, and the pair with the
        // other constant dimension has zero joint entropy.
        assert_relative_eq!(matrix[[0, 3]], 1.0, epsilon = 1e-12);
        let two_constant = Array2::<u32>::zeros((50, 2));
        let degenerate = mutual_information_matrix(two_constant.view());
        assert_relative_eq!(degenerate[[0, 1]], 1.0);
    }

    #[test]
    fn dependent_dimensions_end_up_adjacent() {
        let ordering = order_dimensions(binned_fixture().view()).unwrap();
        let position_of = |dim: usize| {
            ordering
                .permutation
                .iter()
                .position(|&d| d == dim)
                .unwrap()
        };
        assert_eq!(position_of(0).abs_diff(position_of(2)), 1);
    }

    #[test]
    fn ordering_is_deterministic() {
        let first = order_dimensions(binned_fixture().view()).unwrap();
        let second = order_dimensions(binned_fixture().view()).unwrap();
        assert_eq!(first.permutation, second.permutation);
    }

    #[test]
    fn permutation_is_complete() {
        let ordering = order_dimensions(binned_fixture().view()).unwrap();
        let mut sorted = ordering.permutation.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }
}
