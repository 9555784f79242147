//! Visibility-gated propagation of synced terrain changes into the unsynced
//! (render-side) view.
//!
//! ## Regions
//!
//! The corner grid is partitioned into square regions of `region_size`
//! squares, matching the resolution of the external visibility subsystem.
//! A dirty rectangle is split along region boundaries when it is queued:
//!
//! - observed regions whose content changed accumulate into row runs that
//!   go straight to the ready queue,
//! - unobserved regions park their clipped sub-rectangle in a per-region
//!   deferred slot (merged by union),
//! - observed regions with no change since they were last propagated are
//!   skipped.
//!
//! ## Draining
//!
//! [`VisibilityGatedSync::drain_frame`] runs once per render frame. It
//! re-checks deferred regions, coalesces the ready queue, then copies and
//! notifies at most `max_rects` rectangles. Anything over the cap stays
//! queued for the next frame.

use crate::config::{SyncMode, TerrainConfig};
use crate::heightfield::{HeightField, MapDims};
use crate::pipeline;
use crate::rect::Rect;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Coordinates of one visibility region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId {
    pub x: usize,
    pub z: usize,
}

impl RegionId {
    pub const fn new(x: usize, z: usize) -> Self {
        Self { x, z }
    }
}

/// Where a region stands in the propagation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Part of a rectangle waiting in the ready queue.
    Pending,
    /// Changed while unobserved; waits for the region to come into view.
    Deferred,
    /// The unsynced view matches the synced one.
    Propagated,
}

/// Answers whether a region is currently observed by the local viewer.
///
/// Must be side-effect free; it is called for every queued region every frame.
pub trait VisibilityOracle {
    fn is_observed(&self, region: RegionId) -> bool;
}

/// Fallback when no visibility subsystem exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysObserved;

impl VisibilityOracle for AlwaysObserved {
    fn is_observed(&self, _region: RegionId) -> bool {
        true
    }
}

impl<F> VisibilityOracle for F
where
    F: Fn(RegionId) -> bool,
{
    fn is_observed(&self, region: RegionId) -> bool {
        self(region)
    }
}

/// Cheap per-region change detection.
pub trait ChangeDigestTracker: Send + Sync {
    /// The synced content of `region` was modified.
    fn touch(&mut self, region: RegionId);

    /// Whether `region` changed since it was last taken; marks it seen.
    fn take_changed(&mut self, region: RegionId) -> bool;

    /// Forget all outstanding changes.
    fn reset(&mut self) {}
}

/// Treats every region as changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysChanged;

impl ChangeDigestTracker for AlwaysChanged {
    fn touch(&mut self, _region: RegionId) {}

    fn take_changed(&mut self, _region: RegionId) -> bool {
        true
    }
}

/// Wrapping `u8` counters per region: one bumped by synced writes, one
/// caught up when the region is propagated.
///
/// Exactly 256 touches between two checks alias to "unchanged", so the
/// digest only gates re-propagation on [`VisibilityGatedSync::reveal`].
#[derive(Debug, Clone)]
pub struct RegionDigests {
    regions_x: usize,
    synced: Vec<u8>,
    unsynced: Vec<u8>,
}

impl RegionDigests {
    pub fn new(regions_x: usize, regions_z: usize) -> Self {
        let count = regions_x * regions_z;
        Self {
            regions_x,
            synced: vec![0; count],
            unsynced: vec![0; count],
        }
    }

    fn index(&self, region: RegionId) -> usize {
        region.z * self.regions_x + region.x
    }
}

impl ChangeDigestTracker for RegionDigests {
    fn touch(&mut self, region: RegionId) {
        let i = self.index(region);
        self.synced[i] = self.synced[i].wrapping_add(1);
    }

    fn take_changed(&mut self, region: RegionId) -> bool {
        let i = self.index(region);
        if self.synced[i] == self.unsynced[i] {
            return false;
        }
        self.unsynced[i] = self.synced[i];
        true
    }

    fn reset(&mut self) {
        self.unsynced.copy_from_slice(&self.synced);
    }
}

/// Receives one call per drained rectangle, after its unsynced data was copied.
pub trait UnsyncedUpdateSink {
    fn on_unsynced_region_updated(&mut self, rect: Rect);
}

impl UnsyncedUpdateSink for Vec<Rect> {
    fn on_unsynced_region_updated(&mut self, rect: Rect) {
        self.push(rect);
    }
}

/// Adapts a closure into a sink.
///
/// A blanket impl over `FnMut(Rect)` would overlap the `Vec<Rect>` impl, so
/// closures go through this wrapper.
pub struct FnSink<F>(pub F);

impl<F> UnsyncedUpdateSink for FnSink<F>
where
    F: FnMut(Rect),
{
    fn on_unsynced_region_updated(&mut self, rect: Rect) {
        (self.0)(rect)
    }
}

/// Discards notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl UnsyncedUpdateSink for NullSink {
    fn on_unsynced_region_updated(&mut self, _rect: Rect) {}
}

/// Queue of synced changes waiting to reach the unsynced view.
pub struct VisibilityGatedSync {
    mode: SyncMode,
    region_size: i32,
    regions_x: usize,
    regions_z: usize,
    max_x: i32,
    max_z: i32,
    digests: Box<dyn ChangeDigestTracker>,
    ready: VecDeque<Rect>,
    deferred: Vec<Option<Rect>>,
    /// Region indices with a deferred slot, in the order they were parked.
    deferred_order: VecDeque<usize>,
    needs_optimize: bool,
}

impl VisibilityGatedSync {
    pub fn new(dims: &MapDims, config: &TerrainConfig) -> Self {
        let region_size = config.region_size.max(1);
        let regions_x = dims.mapx / region_size + 1;
        let regions_z = dims.mapy / region_size + 1;
        let digests: Box<dyn ChangeDigestTracker> = if config.track_digests {
            Box::new(RegionDigests::new(regions_x, regions_z))
        } else {
            Box::new(AlwaysChanged)
        };

        Self {
            mode: config.sync_mode,
            region_size: region_size as i32,
            regions_x,
            regions_z,
            max_x: dims.mapx as i32,
            max_z: dims.mapy as i32,
            digests,
            ready: VecDeque::new(),
            deferred: vec![None; regions_x * regions_z],
            deferred_order: VecDeque::new(),
            needs_optimize: false,
        }
    }

    /// Replace the change tracker (for instance with a shared digest source).
    pub fn with_digests(mut self, digests: Box<dyn ChangeDigestTracker>) -> Self {
        self.digests = digests;
        self
    }

    pub fn regions(&self) -> (usize, usize) {
        (self.regions_x, self.regions_z)
    }

    /// Region containing corner `(x, z)`.
    pub fn region_of(&self, x: i32, z: i32) -> RegionId {
        RegionId::new((x / self.region_size) as usize, (z / self.region_size) as usize)
    }

    /// Corner rectangle covered by `region`, clipped to the map.
    pub fn region_rect(&self, region: RegionId) -> Rect {
        let (x, z) = (region.x as i32 * self.region_size, region.z as i32 * self.region_size);
        Rect::new(x, z, x + self.region_size - 1, z + self.region_size - 1).clamp_to(self.max_x, self.max_z)
    }

    fn region_index(&self, region: RegionId) -> usize {
        region.z * self.regions_x + region.x
    }

    /// Queue a synced change for propagation.
    ///
    /// The initial whole-map update skips the visibility check since
    /// nothing has been shown yet.
    pub fn enqueue(&mut self, rect: Rect, initial: bool, oracle: &dyn VisibilityOracle) {
        let rect = rect.clamp_to(self.max_x, self.max_z);
        if rect.is_empty() {
            return;
        }

        if initial || self.mode == SyncMode::Aliased {
            self.push_ready(rect);
            return;
        }

        self.split(rect, oracle, true);
    }

    /// Re-run the region split for `rect` without marking anything changed,
    /// for when the viewer gains sight of an area.
    pub fn reveal(&mut self, rect: Rect, oracle: &dyn VisibilityOracle) {
        if self.mode == SyncMode::Aliased {
            return;
        }
        let rect = rect.clamp_to(self.max_x, self.max_z);
        if !rect.is_empty() {
            self.split(rect, oracle, false);
        }
    }

    fn split(&mut self, rect: Rect, oracle: &dyn VisibilityOracle, touch: bool) {
        let r = self.region_size;
        let (rx1, rx2) = (rect.x1 / r, rect.x2 / r);
        let (rz1, rz2) = (rect.z1 / r, rect.z2 / r);

        if touch {
            for rz in rz1..=rz2 {
                for rx in rx1..=rx2 {
                    self.digests.touch(RegionId::new(rx as usize, rz as usize));
                }
            }
        }

        for rz in rz1..=rz2 {
            let z1 = rect.z1.max(rz * r);
            let z2 = rect.z2.min(rz * r + r - 1);
            let mut run: Option<(i32, i32)> = None;

            for rx in rx1..=rx2 {
                let id = RegionId::new(rx as usize, rz as usize);
                let sub = Rect::new(rect.x1.max(rx * r), z1, rect.x2.min(rx * r + r - 1), z2);

                if !oracle.is_observed(id) {
                    self.flush_run(&mut run, z1, z2);
                    self.defer(id, sub);
                    continue;
                }

                let idx = self.region_index(id);
                if let Some(parked) = self.deferred[idx].take() {
                    self.deferred_order.retain(|&i| i != idx);
                    self.push_ready(parked);
                }

                // A fresh write always counts; the digest is still consumed.
                let changed = self.digests.take_changed(id) | touch;
                if changed {
                    run = Some(match run {
                        Some((x1, _)) => (x1, sub.x2),
                        None => (sub.x1, sub.x2),
                    });
                } else {
                    self.flush_run(&mut run, z1, z2);
                }
            }
            self.flush_run(&mut run, z1, z2);
        }
    }

    fn flush_run(&mut self, run: &mut Option<(i32, i32)>, z1: i32, z2: i32) {
        if let Some((x1, x2)) = run.take() {
            self.push_ready(Rect::new(x1, z1, x2, z2));
        }
    }

    fn push_ready(&mut self, rect: Rect) {
        self.ready.push_back(rect);
        self.needs_optimize = true;
    }

    fn defer(&mut self, region: RegionId, rect: Rect) {
        let idx = self.region_index(region);
        if let Some(parked) = self.deferred[idx].as_mut() {
            *parked = parked.union(&rect);
        } else {
            self.deferred[idx] = Some(rect);
            self.deferred_order.push_back(idx);
        }
        trace!(region.x = region.x, region.z = region.z, ?rect, "deferred unobserved terrain update");
    }

    /// Move deferred regions that came into view onto the ready queue.
    fn recheck_deferred(&mut self, oracle: &dyn VisibilityOracle) {
        let parked = std::mem::take(&mut self.deferred_order);
        for idx in parked {
            let id = RegionId::new(idx % self.regions_x, idx / self.regions_x);
            if !oracle.is_observed(id) {
                self.deferred_order.push_back(idx);
                continue;
            }
            let Some(rect) = self.deferred[idx].take() else {
                continue;
            };
            // A parked rect is a known change whatever the digest says.
            self.digests.take_changed(id);
            self.push_ready(rect);
        }
    }

    /// Drop rectangles covered by another queued one and merge rectangles
    /// that line up along a full edge. Queue order is otherwise kept.
    fn optimize(&mut self) {
        let queued: Vec<Rect> = self.ready.drain(..).collect();
        let before = queued.len();

        let mut kept: Vec<Rect> = queued
            .iter()
            .enumerate()
            .filter(|&(i, r)| {
                !queued
                    .iter()
                    .enumerate()
                    .any(|(j, o)| j != i && o.contains(r) && (o != r || j < i))
            })
            .map(|(_, r)| *r)
            .collect();

        let mut i = 0;
        while i < kept.len() {
            let mut grew = false;
            let mut j = i + 1;
            while j < kept.len() {
                if kept[i].joins_horizontally(&kept[j]) || kept[i].joins_vertically(&kept[j]) {
                    kept[i] = kept[i].union(&kept[j]);
                    kept.remove(j);
                    grew = true;
                } else {
                    j += 1;
                }
            }
            if !grew {
                i += 1;
            }
        }

        if kept.len() != before {
            trace!(before, after = kept.len(), "coalesced unsynced update queue");
        }
        self.ready = kept.into();
        self.needs_optimize = false;
    }

    /// Propagate up to `max_rects` ready rectangles into the unsynced view.
    ///
    /// All copies complete before the first notification is sent. Returns
    /// the number of rectangles propagated.
    pub fn drain_frame(
        &mut self,
        max_rects: usize,
        field: &mut HeightField,
        oracle: &dyn VisibilityOracle,
        sink: &mut dyn UnsyncedUpdateSink,
    ) -> usize {
        if !self.deferred_order.is_empty() {
            self.recheck_deferred(oracle);
        }
        if self.needs_optimize {
            self.optimize();
        }

        let count = max_rects.min(self.ready.len());
        if count == 0 {
            return 0;
        }

        for rect in self.ready.iter().take(count) {
            pipeline::refresh_unsynced(field, *rect);
        }
        for rect in self.ready.iter().take(count) {
            sink.on_unsynced_region_updated(*rect);
        }
        self.ready.drain(..count);

        debug!(
            propagated = count,
            remaining = self.ready.len(),
            deferred = self.deferred_order.len(),
            "drained unsynced terrain updates"
        );
        count
    }

    /// Forget every queued and deferred update, after the whole unsynced
    /// view was rebuilt by other means.
    pub fn clear(&mut self) {
        self.ready.clear();
        self.deferred.iter_mut().for_each(|slot| *slot = None);
        self.deferred_order.clear();
        self.digests.reset();
        self.needs_optimize = false;
    }

    /// Rectangles waiting in the ready queue.
    pub fn pending_len(&self) -> usize {
        self.ready.len()
    }

    /// Regions holding a deferred rectangle.
    pub fn deferred_len(&self) -> usize {
        self.deferred_order.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Rect> {
        self.ready.iter()
    }

    /// Whether any part of `rect` still waits for propagation.
    pub fn is_pending(&self, rect: &Rect) -> bool {
        self.ready.iter().any(|r| r.intersect(rect).is_some())
            || self.deferred.iter().flatten().any(|r| r.intersect(rect).is_some())
    }

    pub fn region_state(&self, region: RegionId) -> RegionState {
        if region.x >= self.regions_x || region.z >= self.regions_z {
            return RegionState::Propagated;
        }
        if self.deferred[self.region_index(region)].is_some() {
            return RegionState::Deferred;
        }
        let area = self.region_rect(region);
        if self.ready.iter().any(|r| r.intersect(&area).is_some()) {
            RegionState::Pending
        } else {
            RegionState::Propagated
        }
    }
}
