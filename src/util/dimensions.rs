//! Multi-dimensional extents.
//!
//! Dimensions describe the shape of a dataset or of one of its chunks.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Dimensions of a multi-dimensional array, slowest-varying axis first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Size of each dimension. Empty means scalar (rank 0).
    dims: SmallVec<[u64; 4]>,
}

impl Dimensions {
    /// Create scalar dimensions (rank 0).
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// Create 1D dimensions.
    pub fn d1(size: u64) -> Self {
        Self { dims: smallvec::smallvec![size] }
    }

    /// Create 2D dimensions (rows, columns).
    pub fn d2(rows: u64, cols: u64) -> Self {
        Self { dims: smallvec::smallvec![rows, cols] }
    }

    /// Create from a slice of sizes.
    pub fn from_slice(sizes: &[u64]) -> Self {
        Self { dims: SmallVec::from_slice(sizes) }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Size of a specific dimension, or None if out of range.
    pub fn size(&self, dim: usize) -> Option<u64> {
        self.dims.get(dim).copied()
    }

    pub fn sizes(&self) -> &[u64] {
        &self.dims
    }

    /// Total number of elements (product of all dimensions).
    pub fn num_points(&self) -> u64 {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> SmallVec<[u64; 4]> {
        let mut strides: SmallVec<[u64; 4]> = smallvec::smallvec![1; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Number of chunks along each axis when tiled by `chunk`.
    pub fn chunk_grid(&self, chunk: &Dimensions) -> SmallVec<[u64; 4]> {
        self.dims
            .iter()
            .zip(chunk.dims.iter())
            .map(|(&n, &c)| if c == 0 { 0 } else { n.div_ceil(c) })
            .collect()
    }

    /// True if every axis of `self` fits inside `other`.
    pub fn fits_within(&self, other: &Dimensions) -> bool {
        self.rank() == other.rank() && self.dims.iter().zip(other.dims.iter()).all(|(a, b)| a <= b)
    }
}

impl From<u64> for Dimensions {
    fn from(size: u64) -> Self {
        Self::d1(size)
    }
}

impl From<(u64, u64)> for Dimensions {
    fn from((r, c): (u64, u64)) -> Self {
        Self::d2(r, c)
    }
}

impl From<&[u64]> for Dimensions {
    fn from(v: &[u64]) -> Self {
        Self::from_slice(v)
    }
}

impl From<Vec<u64>> for Dimensions {
    fn from(v: Vec<u64>) -> Self {
        Self { dims: SmallVec::from_vec(v) }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let d = Dimensions::scalar();
        assert_eq!(d.rank(), 0);
        assert!(d.is_scalar());
        assert_eq!(d.num_points(), 1);
    }

    #[test]
    fn test_2d() {
        let d = Dimensions::d2(480, 640);
        assert_eq!(d.rank(), 2);
        assert_eq!(d.size(0), Some(480));
        assert_eq!(d.size(1), Some(640));
        assert_eq!(d.num_points(), 640 * 480);
        assert_eq!(format!("{}", d), "[480 x 640]");
    }

    #[test]
    fn test_strides() {
        let d = Dimensions::from_slice(&[2, 3, 4]);
        assert_eq!(d.strides().as_slice(), &[12, 4, 1]);
    }

    #[test]
    fn test_chunk_grid() {
        let d = Dimensions::d2(100, 90);
        let grid = d.chunk_grid(&Dimensions::d2(25, 40));
        assert_eq!(grid.as_slice(), &[4, 3]);
        assert!(Dimensions::d2(25, 25).fits_within(&d));
        assert!(!Dimensions::d2(101, 25).fits_within(&d));
    }
}
