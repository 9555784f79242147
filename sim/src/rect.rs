//! Inclusive integer rectangles used for dirty-region bookkeeping.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle with inclusive bounds on both axes.
///
/// Coordinates are signed so a rectangle can be expanded past the map edge
/// before being clamped back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub z1: i32,
    pub x2: i32,
    pub z2: i32,
}

impl Rect {
    pub const fn new(x1: i32, z1: i32, x2: i32, z2: i32) -> Self {
        Self { x1, z1, x2, z2 }
    }

    /// Rectangle covering a single cell.
    pub const fn point(x: i32, z: i32) -> Self {
        Self::new(x, z, x, z)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x2 < self.x1 || self.z2 < self.z1
    }

    /// Number of columns covered (0 when empty).
    #[inline]
    pub fn width(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.x2 - self.x1 + 1) as usize
        }
    }

    /// Number of rows covered (0 when empty).
    #[inline]
    pub fn height(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.z2 - self.z1 + 1) as usize
        }
    }

    /// Number of cells covered.
    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Grow by `n` cells on every side.
    pub fn expand(&self, n: i32) -> Self {
        Self::new(self.x1 - n, self.z1 - n, self.x2 + n, self.z2 + n)
    }

    /// Clamp into `[0, max_x] x [0, max_z]`.
    pub fn clamp_to(&self, max_x: i32, max_z: i32) -> Self {
        Self::new(
            self.x1.clamp(0, max_x),
            self.z1.clamp(0, max_z),
            self.x2.clamp(0, max_x),
            self.z2.clamp(0, max_z),
        )
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Self::new(
            self.x1.max(other.x1),
            self.z1.max(other.z1),
            self.x2.min(other.x2),
            self.z2.min(other.z2),
        );
        (!r.is_empty()).then_some(r)
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        Self::new(
            self.x1.min(other.x1),
            self.z1.min(other.z1),
            self.x2.max(other.x2),
            self.z2.max(other.z2),
        )
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.x1 <= other.x1 && self.z1 <= other.z1 && self.x2 >= other.x2 && self.z2 >= other.z2
    }

    /// Whether `other` can be merged into `self` without covering extra cells:
    /// same row span and touching or overlapping columns.
    pub fn joins_horizontally(&self, other: &Rect) -> bool {
        self.z1 == other.z1
            && self.z2 == other.z2
            && other.x1 <= self.x2 + 1
            && self.x1 <= other.x2 + 1
    }

    /// Same column span and touching or overlapping rows.
    pub fn joins_vertically(&self, other: &Rect) -> bool {
        self.x1 == other.x1
            && self.x2 == other.x2
            && other.z1 <= self.z2 + 1
            && self.z1 <= other.z2 + 1
    }

    /// Iterate `(x, z)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> {
        let (x1, x2) = (self.x1, self.x2);
        (self.z1..=self.z2).flat_map(move |z| (x1..=x2).map(move |x| (x, z)))
    }
}
