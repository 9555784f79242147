//! Running min/max of the synced heightmap.
//!
//! Two ways to keep the bounds fresh:
//! - [`BoundsTracker::full_rescan`] walks the whole grid at once (after a
//!   whole-map mutation or on demand).
//! - [`BoundsTracker::advance_paced`] walks one slice per simulation tick, so
//!   a full pass is spread over `pacing_period` ticks. The result lags by up
//!   to one cycle.
//!
//! Both use the same lane-wise reduction: `LANES` independent min/max
//! accumulators over `chunks_exact`, folded horizontally, then a scalar tail.
//! The compiler lowers the lane loop to vector min/max instructions.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Vector width of the min/max reduction (eight `f32` = one AVX register).
pub const LANES: usize = 8;

/// Minimum and maximum height over some part of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightBounds {
    pub min: f32,
    pub max: f32,
}

impl HeightBounds {
    /// Identity of the reduction: folds to whatever it is combined with.
    pub const EMPTY: Self = Self { min: f32::MAX, max: f32::MIN };

    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn include(&mut self, h: f32) {
        self.min = self.min.min(h);
        self.max = self.max.max(h);
    }

    #[inline]
    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

impl Default for HeightBounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Fold `data` into `acc` using `LANES`-wide accumulators plus a scalar tail.
pub fn reduce_min_max(data: &[f32], acc: HeightBounds) -> HeightBounds {
    let mut mins = [acc.min; LANES];
    let mut maxs = [acc.max; LANES];

    let chunks = data.chunks_exact(LANES);
    let tail = chunks.remainder();

    for chunk in chunks {
        for lane in 0..LANES {
            mins[lane] = mins[lane].min(chunk[lane]);
            maxs[lane] = maxs[lane].max(chunk[lane]);
        }
    }

    let mut out = acc;
    for lane in 0..LANES {
        out.min = out.min.min(mins[lane]);
        out.max = out.max.max(maxs[lane]);
    }
    for &h in tail {
        out.include(h);
    }
    out
}

/// Tracks initial, current and in-progress (provisional) height bounds.
#[derive(Debug, Clone)]
pub struct BoundsTracker {
    initial: HeightBounds,
    current: HeightBounds,
    provisional: HeightBounds,
    pacing_period: u64,
    /// Set by every synced mutation; sampled at the start of each cycle.
    updated: bool,
    /// Whether the running cycle is scanning (a mutation preceded it).
    processing: bool,
}

impl BoundsTracker {
    pub fn new(pacing_period: u64) -> Self {
        Self {
            initial: HeightBounds::EMPTY,
            current: HeightBounds::EMPTY,
            provisional: HeightBounds::EMPTY,
            pacing_period: pacing_period.max(1),
            updated: false,
            processing: false,
        }
    }

    /// Establish the load-time bounds; initial, current and provisional agree.
    pub fn init_from(&mut self, corners: &[f32]) {
        let bounds = reduce_min_max(corners, HeightBounds::EMPTY);
        self.initial = bounds;
        self.current = bounds;
        self.provisional = bounds;
    }

    /// Record that the synced grid changed since the last cycle start.
    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    /// Rescan the whole grid and publish the result immediately.
    pub fn full_rescan(&mut self, corners: &[f32]) -> HeightBounds {
        let bounds = scan_all(corners);
        self.provisional = bounds;
        self.current = bounds;
        debug!(min = bounds.min, max = bounds.max, "full height bounds rescan");
        bounds
    }

    /// Scan the slice of the grid belonging to `tick` within its pacing cycle.
    ///
    /// At slice 0 the previous cycle's result is committed (only if that
    /// cycle was scanning) and a new cycle starts scanning only if the grid
    /// was mutated since. An unmutated grid leaves `current` untouched.
    pub fn advance_paced(&mut self, tick: u64, corners: &[f32]) {
        let period = self.pacing_period;
        let slice = tick % period;

        if slice == 0 {
            if self.processing {
                self.current = self.provisional;
            }
            self.processing = self.updated;
            self.updated = false;
        }

        if !self.processing {
            return;
        }

        if slice == 0 {
            self.provisional = HeightBounds::EMPTY;
        }

        let n = corners.len() as u64;
        let begin = (slice * n / period) as usize;
        let end = ((slice + 1) * n / period) as usize;
        self.provisional = reduce_min_max(&corners[begin..end], self.provisional);
    }

    pub fn initial(&self) -> HeightBounds {
        self.initial
    }

    pub fn current(&self) -> HeightBounds {
        self.current
    }

    pub fn provisional(&self) -> HeightBounds {
        self.provisional
    }

    pub fn pacing_period(&self) -> u64 {
        self.pacing_period
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// No point of the terrain lies below sea level.
    pub fn is_above_water(&self) -> bool {
        self.current.min >= 0.0
    }

    /// The whole terrain lies below sea level.
    pub fn is_under_water(&self) -> bool {
        self.current.max < 0.0
    }
}

#[cfg(feature = "parallel")]
fn scan_all(corners: &[f32]) -> HeightBounds {
    // min/max are exact, so the split does not affect the result
    corners
        .par_chunks(LANES * 1024)
        .map(|chunk| reduce_min_max(chunk, HeightBounds::EMPTY))
        .reduce(|| HeightBounds::EMPTY, HeightBounds::merge)
}

#[cfg(not(feature = "parallel"))]
fn scan_all(corners: &[f32]) -> HeightBounds {
    reduce_min_max(corners, HeightBounds::EMPTY)
}
