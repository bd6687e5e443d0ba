//! Hilbert curve mapping between multidimensional bin coordinates and a
//! single curve position.
//!
//! The curve provides the locality-preserving total order the rest of the
//! crate works on: points close on the curve are close in bin space with
//! high probability, which lets population comparisons run over a plain
//! integer index instead of a D-dimensional grid.
//!
//! The transform is Skilling's transpose-and-rotate construction: an
//! explicit loop over bit planes, MSB first, carrying a rotation/reflection
//! state between planes. Everything is exact integer arithmetic; the index
//! is a `u128`, so `order * n_dims` may not exceed 128 bits.

use anyhow::{Result, anyhow};

/// Maps bin coordinate tuples to Hilbert curve positions and back.
///
/// An optional interleave permutation reorders the coordinate tuple before
/// encoding (and after decoding), so callers can feed dimensions to the
/// curve in an order that groups statistically dependent channels.
#[derive(Debug, Clone)]
pub struct HilbertEncoder {
    n_dims: usize,
    order: u32,
    permutation: Vec<usize>,
}

impl HilbertEncoder {
    /// Create an encoder for `n_dims` dimensions at `order` bits per
    /// dimension, with the natural dimension order.
    pub fn new(n_dims: usize, order: u32) -> Result<Self> {
        Self::with_permutation(n_dims, order, (0..n_dims).collect())
    }

    /// Create an encoder that interleaves dimensions in the given order.
    /// `permutation[j]` is the input dimension fed to curve axis `j`.
    pub fn with_permutation(n_dims: usize, order: u32, permutation: Vec<usize>) -> Result<Self> {
        if n_dims == 0 {
            return Err(anyhow!("Hilbert encoder needs at least one dimension"));
        }
        if order == 0 || order > 32 {
            return Err(anyhow!("Curve order must be in 1..=32, got {order}"));
        }
        if order as usize * n_dims > 128 {
            return Err(anyhow!(
                "Curve order {order} with {n_dims} dimensions exceeds the 128-bit index space"
            ));
        }
        if permutation.len() != n_dims {
            return Err(anyhow!(
                "Interleave permutation has length {} but the encoder has {} dimensions",
                permutation.len(),
                n_dims
            ));
        }
        let mut seen = vec![false; n_dims];
        for &dim in &permutation {
            if dim >= n_dims || seen[dim] {
                return Err(anyhow!(
                    "Interleave permutation is not a permutation of 0..{n_dims}"
                ));
            }
            seen[dim] = true;
        }
        Ok(HilbertEncoder {
            n_dims,
            order,
            permutation,
        })
    }

    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Total number of addressable curve positions, `2^(order * n_dims)`.
    /// `None` when the full 128-bit space is in use.
    pub fn capacity(&self) -> Option<u128> {
        let bits = self.order as usize * self.n_dims;
        if bits == 128 { None } else { Some(1u128 << bits) }
    }

    /// Map a coordinate tuple to its curve position.
    ///
    /// Every coordinate must be in `[0, 2^order)`; anything larger is a
    /// caller error and is rejected rather than truncated.
    pub fn encode(&self, coords: &[u32]) -> Result<u128> {
        if coords.len() != self.n_dims {
            return Err(anyhow!(
                "Expected {} coordinates, got {}",
                self.n_dims,
                coords.len()
            ));
        }
        let limit = self.axis_limit();
        let mut axes: Vec<u32> = Vec::with_capacity(self.n_dims);
        for (axis, &dim) in self.permutation.iter().enumerate() {
            let coord = coords[dim];
            if u64::from(coord) >= limit {
                return Err(anyhow!(
                    "Coordinate {} on dimension {} is outside [0, {}) for curve order {} (axis {})",
                    coord,
                    dim,
                    limit,
                    self.order,
                    axis
                ));
            }
            axes.push(coord);
        }
        axes_to_transpose(&mut axes, self.order);
        Ok(interleave(&axes, self.order))
    }

    /// Map a curve position back to its coordinate tuple.
    pub fn decode(&self, index: u128) -> Result<Vec<u32>> {
        if let Some(capacity) = self.capacity() {
            if index >= capacity {
                return Err(anyhow!(
                    "Curve position {} is outside [0, {}) for order {} and {} dimensions",
                    index,
                    capacity,
                    self.order,
                    self.n_dims
                ));
            }
        }
        let mut axes = deinterleave(index, self.n_dims, self.order);
        transpose_to_axes(&mut axes, self.order);
        let mut coords = vec![0u32; self.n_dims];
        for (axis, &dim) in self.permutation.iter().enumerate() {
            coords[dim] = axes[axis];
        }
        Ok(coords)
    }

    fn axis_limit(&self) -> u64 {
        1u64 << self.order
    }
}

/// In-place transform from axis coordinates to Skilling's transpose form,
/// in which the curve position is the bit interleave of the entries.
fn axes_to_transpose(x: &mut [u32], order: u32) {
    let n = x.len();
    let m = 1u32 << (order - 1);

    // Inverse undo: fold the rotation state of each bit plane, MSB first.
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // Gray encode.
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for value in x.iter_mut() {
        *value ^= t;
    }
}

/// Inverse of [`axes_to_transpose`].
fn transpose_to_axes(x: &mut [u32], order: u32) {
    let n = x.len();
    let top = 2u64 << (order - 1);

    // Gray decode by H ^ (H >> 1).
    let t = x[n - 1] >> 1;
    for i in (1..n).rev() {
        x[i] ^= x[i - 1];
    }
    x[0] ^= t;

    // Undo excess work, LSB first.
    let mut q = 2u64;
    while q != top {
        let mask = q as u32;
        let p = mask - 1;
        for i in (0..n).rev() {
            if x[i] & mask != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q <<= 1;
    }
}

/// Interleave the transpose entries into a single integer, taking bit
/// plane `order-1` of every axis first.
fn interleave(x: &[u32], order: u32) -> u128 {
    let mut index = 0u128;
    for plane in (0..order).rev() {
        for &axis in x {
            index = (index << 1) | u128::from((axis >> plane) & 1);
        }
    }
    index
}

/// Inverse of [`interleave`].
fn deinterleave(index: u128, n_dims: usize, order: u32) -> Vec<u32> {
    let mut axes = vec![0u32; n_dims];
    let total_bits = order as usize * n_dims;
    for k in 0..total_bits {
        let bit = (index >> (total_bits - 1 - k)) & 1;
        let axis = k % n_dims;
        let plane = order - 1 - (k / n_dims) as u32;
        axes[axis] |= (bit as u32) << plane;
    }
    axes
}
