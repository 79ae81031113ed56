//! Hyperslab selections.

use std::ops::Range;

use smallvec::SmallVec;

use crate::util::{Dimensions, Error, Result};

/// A rectangular region of a dataset: one half-open range per axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    ranges: SmallVec<[Range<u64>; 4]>,
}

impl Selection {
    pub fn new(ranges: impl IntoIterator<Item = Range<u64>>) -> Self {
        Self { ranges: ranges.into_iter().collect() }
    }

    /// The full extent of `shape`.
    pub fn all(shape: &Dimensions) -> Self {
        Self::new(shape.sizes().iter().map(|&n| 0..n))
    }

    /// A 2-D region.
    pub fn rows_cols(rows: Range<u64>, cols: Range<u64>) -> Self {
        Self::new([rows, cols])
    }

    pub fn ranges(&self) -> &[Range<u64>] {
        &self.ranges
    }

    /// Extent of the selected region.
    pub fn extent(&self) -> Dimensions {
        Dimensions::from(
            self.ranges
                .iter()
                .map(|r| r.end.saturating_sub(r.start))
                .collect::<Vec<_>>(),
        )
    }

    pub fn num_points(&self) -> u64 {
        self.extent().num_points()
    }

    /// Check the selection against a dataset extent.
    pub fn validate(&self, shape: &Dimensions) -> Result<()> {
        if self.ranges.len() != shape.rank() {
            return Err(Error::InvalidSelection(format!(
                "selection rank {} does not match dataset rank {}",
                self.ranges.len(),
                shape.rank()
            )));
        }
        for (axis, (r, &n)) in self.ranges.iter().zip(shape.sizes()).enumerate() {
            if r.start > r.end || r.end > n {
                return Err(Error::InvalidSelection(format!(
                    "range {}..{} out of bounds for axis {} of extent {}",
                    r.start, r.end, axis, n
                )));
            }
        }
        Ok(())
    }

    /// Overlap of two selections of the same rank, None when it is empty.
    pub fn intersect(&self, other: &Selection) -> Option<Selection> {
        if self.ranges.len() != other.ranges.len() {
            return None;
        }
        let ranges: SmallVec<[Range<u64>; 4]> = self
            .ranges
            .iter()
            .zip(other.ranges.iter())
            .map(|(a, b)| a.start.max(b.start)..a.end.min(b.end))
            .collect();
        if ranges.iter().any(|r| r.start >= r.end) {
            return None;
        }
        Some(Self { ranges })
    }

    /// The same region expressed relative to the origin of `outer`.
    fn relative_to(&self, outer: &Selection) -> Selection {
        Self::new(self.ranges.iter().zip(outer.ranges.iter()).map(|(r, o)| r.start - o.start..r.end - o.start))
    }

    /// Visit the runs where this selection overlaps `chunk`.
    ///
    /// The callback receives the element offset inside the packed chunk, the
    /// element offset inside the packed selection buffer, and the run length.
    pub(crate) fn for_each_chunk_run(&self, chunk: &Selection, mut f: impl FnMut(usize, usize, usize)) {
        let Some(overlap) = self.intersect(chunk) else { return };

        let mut packed = Vec::new();
        overlap
            .relative_to(self)
            .for_each_run(&self.extent(), |a, _, _| packed.push(a));

        let mut runs = packed.into_iter();
        overlap.relative_to(chunk).for_each_run(&chunk.extent(), |a, _, n| {
            if let Some(p) = runs.next() {
                f(a, p, n);
            }
        });
    }

    /// Visit each contiguous run of the selection inside a row-major array of
    /// `shape`. The callback receives the element offset in the array, the
    /// element offset in the packed selection buffer, and the run length.
    pub(crate) fn for_each_run(&self, shape: &Dimensions, mut f: impl FnMut(usize, usize, usize)) {
        let rank = self.ranges.len();
        if rank == 0 {
            f(0, 0, 1);
            return;
        }
        if self.ranges.iter().any(|r| r.start >= r.end) {
            return;
        }

        let strides = shape.strides();
        let last = &self.ranges[rank - 1];
        let run = (last.end - last.start) as usize;

        let mut index: SmallVec<[u64; 4]> = self.ranges[..rank - 1].iter().map(|r| r.start).collect();
        let mut packed = 0usize;
        loop {
            let base: u64 = index
                .iter()
                .zip(strides.iter())
                .map(|(i, s)| i * s)
                .sum::<u64>()
                + last.start;
            f(base as usize, packed, run);
            packed += run;

            // Odometer over the outer axes.
            let mut axis = rank - 1;
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                index[axis] += 1;
                if index[axis] < self.ranges[axis].end {
                    break;
                }
                index[axis] = self.ranges[axis].start;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let shape = Dimensions::d2(10, 20);
        assert!(Selection::rows_cols(0..10, 5..20).validate(&shape).is_ok());
        assert!(Selection::rows_cols(0..11, 0..1).validate(&shape).is_err());
        assert!(Selection::new([0..1]).validate(&shape).is_err());
    }

    #[test]
    fn test_runs_2d() {
        let shape = Dimensions::d2(4, 5);
        let sel = Selection::rows_cols(1..3, 2..4);
        let mut runs = Vec::new();
        sel.for_each_run(&shape, |a, p, n| runs.push((a, p, n)));
        assert_eq!(runs, vec![(7, 0, 2), (12, 2, 2)]);
        assert_eq!(sel.num_points(), 4);
    }

    #[test]
    fn test_intersect() {
        let a = Selection::rows_cols(0..5, 2..8);
        let b = Selection::rows_cols(3..10, 0..4);
        assert_eq!(a.intersect(&b), Some(Selection::rows_cols(3..5, 2..4)));
        assert_eq!(a.intersect(&Selection::rows_cols(5..6, 0..8)), None);
        assert_eq!(Selection::new([]).intersect(&Selection::new([])), Some(Selection::new([])));
    }

    #[test]
    fn test_chunk_runs() {
        // A 3x4 window starting at (1, 2) against the chunk rows 0..2, cols 4..8.
        let sel = Selection::rows_cols(1..4, 2..6);
        let chunk = Selection::rows_cols(0..2, 4..8);
        let mut runs = Vec::new();
        sel.for_each_chunk_run(&chunk, |c, p, n| runs.push((c, p, n)));
        assert_eq!(runs, vec![(4, 2, 2)]);

        let mut total = 0;
        sel.for_each_chunk_run(&Selection::rows_cols(2..6, 0..4), |_, _, n| total += n);
        assert_eq!(total, 4);
    }

    #[test]
    fn test_runs_3d_and_empty() {
        let shape = Dimensions::from_slice(&[2, 2, 3]);
        let sel = Selection::all(&shape);
        let mut total = 0;
        sel.for_each_run(&shape, |_, _, n| total += n);
        assert_eq!(total, 12);

        let empty = Selection::rows_cols(2..2, 0..3);
        let mut called = false;
        empty.for_each_run(&Dimensions::d2(4, 3), |_, _, _| called = true);
        assert!(!called);
    }
}
