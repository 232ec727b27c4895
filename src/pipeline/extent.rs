//! Structured extents and partition requests.
//!
//! An [`Extent`] is an inclusive `[xmin, xmax, ymin, ymax, zmin, zmax]` box in
//! point-index space. `max == min - 1` on any axis means "no points"; the
//! canonical empty box is [`Extent::EMPTY`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a data object describes which part of the whole it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentType {
    /// Structured index-space box (images, grids).
    #[default]
    Structured,
    /// `(piece, number_of_pieces)` shard of unstructured data.
    Pieces,
}

/// Inclusive structured extent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent(pub [i32; 6]);

impl Extent {
    pub const EMPTY: Extent = Extent([0, -1, 0, -1, 0, -1]);

    pub const fn new(x0: i32, x1: i32, y0: i32, y1: i32, z0: i32, z1: i32) -> Self {
        Self([x0, x1, y0, y1, z0, z1])
    }

    #[inline]
    pub fn min(&self, axis: usize) -> i32 {
        self.0[axis * 2]
    }

    #[inline]
    pub fn max(&self, axis: usize) -> i32 {
        self.0[axis * 2 + 1]
    }

    #[inline]
    pub fn set_axis(&mut self, axis: usize, min: i32, max: i32) {
        self.0[axis * 2] = min;
        self.0[axis * 2 + 1] = max;
    }

    /// True if any axis holds no points.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| self.max(a) < self.min(a))
    }

    /// Whether every point of `other` lies inside `self`. An empty extent is
    /// contained in anything.
    pub fn contains(&self, other: &Extent) -> bool {
        other.is_empty()
            || (0..3).all(|a| other.min(a) >= self.min(a) && other.max(a) <= self.max(a))
    }

    /// Point counts per axis (0 on empty axes).
    pub fn dimensions(&self) -> [usize; 3] {
        let dim = |a: usize| {
            (i64::from(self.max(a)) - i64::from(self.min(a)) + 1).max(0) as usize
        };
        [dim(0), dim(1), dim(2)]
    }

    pub fn num_points(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.dimensions().iter().product()
    }

    /// Grow by `n` points on both sides of every axis, saturating at the
    /// `i32` range.
    pub fn grow(&self, n: i32) -> Extent {
        let mut out = *self;
        for a in 0..3 {
            out.set_axis(
                a,
                self.min(a).saturating_sub(n),
                self.max(a).saturating_add(n),
            );
        }
        out
    }

    /// Clamp every bound into `bounds`. May produce an empty extent.
    pub fn clamp_to(&self, bounds: &Extent) -> Extent {
        let mut out = *self;
        for a in 0..3 {
            out.set_axis(
                a,
                self.min(a).max(bounds.min(a)),
                self.max(a).min(bounds.max(a)),
            );
        }
        out
    }

    /// Linear offset of point `(i, j, k)` with x varying fastest.
    pub fn point_offset(&self, i: i32, j: i32, k: i32) -> Option<usize> {
        let [nx, ny, _] = self.dimensions();
        let p = [i, j, k];
        if (0..3).any(|a| p[a] < self.min(a) || p[a] > self.max(a)) {
            return None;
        }
        let (di, dj, dk) = (
            (i - self.min(0)) as usize,
            (j - self.min(1)) as usize,
            (k - self.min(2)) as usize,
        );
        Some(di + nx * (dj + ny * dk))
    }

    /// Iterate over all points in x-fastest order.
    pub fn points(&self) -> impl Iterator<Item = [i32; 3]> + '_ {
        let e = *self;
        (e.min(2)..=e.max(2))
            .flat_map(move |k| (e.min(1)..=e.max(1)).map(move |j| (j, k)))
            .flat_map(move |(j, k)| (e.min(0)..=e.max(0)).map(move |i| [i, j, k]))
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<[i32; 6]> for Extent {
    fn from(v: [i32; 6]) -> Self {
        Self(v)
    }
}

impl fmt::Debug for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}]x[{},{}]x[{},{}]",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The request carried by one output, as seen by the node asked to fill it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRequest {
    pub extent_type: ExtentType,
    pub whole_extent: Extent,
    pub update_extent: Extent,
    pub piece: i32,
    pub number_of_pieces: i32,
    pub ghost_level: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_extent() {
        assert!(Extent::EMPTY.is_empty());
        assert_eq!(Extent::EMPTY.num_points(), 0);
        assert!(!Extent::new(0, 0, 0, 0, 0, 0).is_empty());
        assert!(Extent::new(3, 2, 0, 9, 0, 0).is_empty());
    }

    #[test]
    fn test_contains() {
        let whole = Extent::new(0, 9, 0, 9, 0, 0);
        assert!(whole.contains(&Extent::new(3, 5, 3, 5, 0, 0)));
        assert!(!whole.contains(&Extent::new(3, 10, 3, 5, 0, 0)));
        assert!(!whole.contains(&Extent::new(-1, 5, 3, 5, 0, 0)));
        assert!(whole.contains(&Extent::new(20, 19, 0, 0, 0, 0)));
        assert!(Extent::EMPTY.contains(&Extent::EMPTY));
    }

    #[test]
    fn test_grow_and_clamp() {
        let whole = Extent::new(0, 9, 0, 9, 0, 0);
        let req = Extent::new(0, 5, 3, 5, 0, 0).grow(1);
        assert_eq!(req, Extent::new(-1, 6, 2, 6, -1, 1));
        assert_eq!(req.clamp_to(&whole), Extent::new(0, 6, 2, 6, 0, 0));
    }

    #[test]
    fn test_grow_saturates() {
        let whole = Extent::new(0, 9, 0, 9, 0, 0);
        let huge = Extent::new(3, 5, 3, 5, 0, 0).grow(i32::MAX);
        assert_eq!(huge.min(0), 3 - i32::MAX);
        assert_eq!(huge.max(0), i32::MAX);
        assert_eq!(huge.clamp_to(&whole), whole);

        let full = Extent::new(i32::MIN, i32::MAX, 0, 0, 0, 0);
        assert_eq!(full.dimensions()[0], 1usize << 32);
    }

    #[test]
    fn test_point_offset() {
        let e = Extent::new(2, 4, 1, 2, 0, 0);
        assert_eq!(e.dimensions(), [3, 2, 1]);
        assert_eq!(e.point_offset(2, 1, 0), Some(0));
        assert_eq!(e.point_offset(4, 1, 0), Some(2));
        assert_eq!(e.point_offset(2, 2, 0), Some(3));
        assert_eq!(e.point_offset(5, 2, 0), None);
    }

    #[test]
    fn test_points_iteration_order() {
        let e = Extent::new(0, 1, 0, 1, 0, 0);
        let pts: Vec<_> = e.points().collect();
        assert_eq!(pts, vec![[0, 0, 0], [1, 0, 0], [0, 1, 0], [1, 1, 0]]);
        assert_eq!(Extent::EMPTY.points().count(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Extent::new(0, 9, 0, 9, 0, 0).to_string(),
            "[0,9]x[0,9]x[0,0]"
        );
    }
}
