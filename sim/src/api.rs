//! Public API for the terrain engine.
//!
//! [`TerrainMap`] is the context object that owns every terrain grid and
//! the components operating on them. It is created once per loaded map by
//! whatever owns the match and handed around by reference; there is no
//! global terrain state.
//!
//! ## Update Flow
//!
//! 1. `write_synced_region` overwrites authoritative corner heights
//! 2. `update_synced` re-derives the touched region and queues it for the
//!    unsynced view
//! 3. `drain_frame` (once per render frame) propagates a bounded number of
//!    queued rectangles and notifies the sink
//! 4. `advance_bounds` (once per simulation tick) keeps min/max heights fresh
//!
//! [`TerrainWorld`] wires these steps into `bevy_ecs` schedules with a fixed
//! simulation timestep.

use crate::bounds::{BoundsTracker, HeightBounds};
use crate::checksum::{self, TerrainDelta};
use crate::config::TerrainConfig;
use crate::error::{TerrainError, TerrainResult};
use crate::heightfield::{HeightField, MapDims};
use crate::pipeline;
use crate::rect::Rect;
use crate::sync::{AlwaysObserved, UnsyncedUpdateSink, VisibilityGatedSync, VisibilityOracle};
use crate::systems::*;
use crate::terrain::{TerrainPalette, TerrainSnapshot, TerrainType};
use bevy_ecs::prelude::*;
use tracing::{debug, info, warn};

/// Simulation rate the paced bounds scan is tuned for (30 Hz).
pub const FIXED_TIMESTEP: f32 = 1.0 / 30.0;

/// A loaded map's terrain.
#[derive(Resource)]
pub struct TerrainMap {
    map_name: String,
    config: TerrainConfig,
    field: HeightField,
    sync: VisibilityGatedSync,
    bounds: BoundsTracker,
    palette: TerrainPalette,
    visibility: Box<dyn VisibilityOracle + Send + Sync>,
    /// Type grid as handed over by the loader.
    map_file_types: Vec<u8>,
    baseline_checksum: u32,
}

impl TerrainMap {
    /// Build the terrain from a fully populated corner grid.
    ///
    /// `corners` must hold `(width + 1) * (height + 1)` heights, row-major.
    /// A missing or malformed type grid degrades to type 0 instead of failing.
    pub fn load(
        map_name: &str,
        width: usize,
        height: usize,
        corners: &[f32],
        types: Option<&[u8]>,
        config: TerrainConfig,
    ) -> TerrainResult<Self> {
        Self::load_with_palette(map_name, width, height, corners, types, config, TerrainPalette::default())
    }

    pub fn load_with_palette(
        map_name: &str,
        width: usize,
        height: usize,
        corners: &[f32],
        types: Option<&[u8]>,
        config: TerrainConfig,
        palette: TerrainPalette,
    ) -> TerrainResult<Self> {
        let reject = |reason: &str| TerrainError::Configuration { width, height, reason: reason.to_string() };
        if config.region_size == 0 {
            return Err(reject("visibility region size must be positive"));
        }
        if config.pacing_period == 0 {
            return Err(reject("bounds pacing period must be positive"));
        }
        if palette.is_empty() {
            return Err(reject("terrain palette is empty"));
        }

        let mut field = HeightField::new(width, height, &config)?;
        let dims = *field.dims();
        let full = dims.corner_rect();
        field.write_synced_region(full, corners)?;

        match types {
            Some(grid) if grid.len() == dims.half_count() && palette.covers(grid) => {
                field.types.copy_from_slice(grid);
            }
            Some(grid) if grid.len() == dims.half_count() => {
                let mut unknown = 0usize;
                for (dst, &id) in field.types.iter_mut().zip(grid) {
                    if palette.get(id).is_some() {
                        *dst = id;
                    } else {
                        unknown += 1;
                    }
                }
                if unknown > 0 {
                    warn!(map = map_name, unknown, "type grid names unknown terrain types; using type 0");
                }
            }
            Some(grid) => warn!(
                map = map_name,
                expected = dims.half_count(),
                actual = grid.len(),
                "type grid has the wrong size; using type 0"
            ),
            None => warn!(map = map_name, "no type grid supplied; using type 0"),
        }

        field.map_file_heights.copy_from_slice(corners);
        field.original_heights.copy_from_slice(corners);
        pipeline::apply(&mut field, full, true);

        let mut bounds = BoundsTracker::new(config.pacing_period);
        bounds.init_from(corners);

        let mut sync = VisibilityGatedSync::new(&dims, &config);
        sync.enqueue(full, true, &AlwaysObserved);

        let baseline_checksum = checksum::height_checksum(corners, map_name);
        let map_file_types = field.types.clone();

        info!(
            map = map_name,
            width,
            height,
            sync_mode = ?config.sync_mode,
            bytes = field.footprint_bytes(),
            checksum = baseline_checksum,
            min = bounds.initial().min,
            max = bounds.initial().max,
            "terrain loaded"
        );

        Ok(Self {
            map_name: map_name.to_string(),
            config,
            field,
            sync,
            bounds,
            palette,
            visibility: Box::new(AlwaysObserved),
            map_file_types,
            baseline_checksum,
        })
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn dims(&self) -> &MapDims {
        self.field.dims()
    }

    /// Read access to every grid.
    pub fn field(&self) -> &HeightField {
        &self.field
    }

    pub fn bounds(&self) -> &BoundsTracker {
        &self.bounds
    }

    pub fn sync(&self) -> &VisibilityGatedSync {
        &self.sync
    }

    pub fn palette(&self) -> &TerrainPalette {
        &self.palette
    }

    /// Install the visibility subsystem's predicate.
    pub fn set_visibility(&mut self, oracle: impl VisibilityOracle + Send + Sync + 'static) {
        self.visibility = Box::new(oracle);
    }

    // ------------------------------------------------------------------
    // Synced mutation
    // ------------------------------------------------------------------

    /// Overwrite synced corner heights. Follow with [`Self::update_synced`].
    pub fn write_synced_region(&mut self, rect: Rect, values: &[f32]) -> TerrainResult<()> {
        self.field.write_synced_region(rect, values)
    }

    /// Re-derive everything depending on corners in `rect` and queue the
    /// change for the unsynced view. Parts of `rect` off the map are ignored.
    pub fn update_synced(&mut self, rect: Rect) {
        let dims = *self.field.dims();
        let rect = rect.clamp_to(dims.mapx as i32, dims.mapy as i32);
        if rect.is_empty() {
            return;
        }

        pipeline::apply(&mut self.field, rect, false);
        self.bounds.mark_updated();
        self.sync.enqueue(rect, false, &*self.visibility);
    }

    /// Write and re-derive in one step.
    pub fn set_heights(&mut self, rect: Rect, values: &[f32]) -> TerrainResult<()> {
        self.write_synced_region(rect, values)?;
        self.update_synced(rect);
        Ok(())
    }

    /// Change the terrain type of one slope cell.
    pub fn set_type(&mut self, x: usize, z: usize, type_id: u8) -> TerrainResult<()> {
        if self.palette.get(type_id).is_none() {
            return Err(TerrainError::UnknownTerrainType { id: type_id, palette_len: self.palette.len() });
        }
        self.field.set_type(x, z, type_id)
    }

    /// Built-in terrain type of one slope cell, `None` for ids only a custom
    /// palette defines.
    pub fn terrain_type_at(&self, x: usize, z: usize) -> TerrainResult<Option<TerrainType>> {
        Ok(TerrainType::from_id(self.field.read_type(x, z)?))
    }

    // ------------------------------------------------------------------
    // Per-frame and per-tick work
    // ------------------------------------------------------------------

    /// Propagate up to `max_rects` queued changes into the unsynced view.
    pub fn drain_frame(&mut self, max_rects: usize, sink: &mut dyn UnsyncedUpdateSink) -> usize {
        self.sync.drain_frame(max_rects, &mut self.field, &*self.visibility, sink)
    }

    /// Re-check `rect` after the viewer gained sight of it.
    pub fn reveal(&mut self, rect: Rect) {
        self.sync.reveal(rect, &*self.visibility);
    }

    /// Make the whole unsynced view identical to the synced one right now,
    /// dropping every queued update (e.g. when becoming a spectator).
    pub fn copy_synced_to_unsynced(&mut self, sink: &mut dyn UnsyncedUpdateSink) {
        let full = self.field.dims().corner_rect();
        pipeline::refresh_unsynced(&mut self.field, full);
        self.sync.clear();
        sink.on_unsynced_region_updated(full);
        debug!(map = %self.map_name, "copied synced terrain to unsynced view");
    }

    /// Fold one paced slice of the synced grid into the running bounds.
    pub fn advance_bounds(&mut self, tick: u64) {
        self.bounds.advance_paced(tick, &self.field.synced.corners);
    }

    /// Recompute the bounds over the whole synced grid now.
    pub fn full_rescan(&mut self) -> HeightBounds {
        self.bounds.full_rescan(&self.field.synced.corners)
    }

    pub fn is_above_water(&self) -> bool {
        self.bounds.is_above_water()
    }

    pub fn is_under_water(&self) -> bool {
        self.bounds.is_under_water()
    }

    // ------------------------------------------------------------------
    // Checksums and persistence
    // ------------------------------------------------------------------

    /// Checksum of the heights as loaded from the map.
    pub fn baseline_checksum(&self) -> u32 {
        self.baseline_checksum
    }

    pub fn height_checksum(&self) -> u32 {
        checksum::height_checksum(&self.field.synced.corners, &self.map_name)
    }

    pub fn type_checksum(&self) -> u32 {
        checksum::type_checksum(&self.field.types, &self.palette, &self.map_name)
    }

    /// Snapshot the current heights as the match-start reference and return
    /// their checksum. Edits made before this point are pre-game edits.
    pub fn begin_match(&mut self) -> u32 {
        let field = &mut self.field;
        field.original_heights.copy_from_slice(&field.synced.corners);
        self.bounds.init_from(&field.original_heights);

        let checksum = self.height_checksum();
        info!(map = %self.map_name, checksum, "terrain match reference taken");
        checksum
    }

    /// XOR deltas of all terrain edits against the loaded map.
    pub fn save_changes(&self) -> TerrainResult<TerrainDelta> {
        let field = &self.field;
        let delta = TerrainDelta {
            before_match: checksum::xor_height_delta(&field.map_file_heights, &field.original_heights)?,
            during_match: checksum::xor_height_delta(&field.original_heights, &field.synced.corners)?,
            types: checksum::xor_type_delta(&self.map_file_types, &field.types)?,
        };
        debug!(map = %self.map_name, changed = delta.changed_words(), "saved terrain changes");
        Ok(delta)
    }

    /// Rebuild heights and types from a saved delta and re-derive the map.
    ///
    /// Nothing is modified if the payload does not fit this map.
    pub fn restore_changes(&mut self, delta: &TerrainDelta) -> TerrainResult<()> {
        let field = &mut self.field;
        let mut original = vec![0.0; field.map_file_heights.len()];
        checksum::apply_height_delta(&field.map_file_heights, &delta.before_match, &mut original)?;
        let mut current = vec![0.0; original.len()];
        checksum::apply_height_delta(&original, &delta.during_match, &mut current)?;
        let mut types = vec![0u8; self.map_file_types.len()];
        checksum::apply_type_delta(&self.map_file_types, &delta.types, &mut types)?;

        field.original_heights = original;
        field.synced.corners = current;
        field.types = types;

        let full = field.dims().corner_rect();
        pipeline::apply(field, full, false);
        self.bounds.full_rescan(&self.field.synced.corners);
        self.sync.clear();
        self.sync.enqueue(full, true, &AlwaysObserved);

        info!(map = %self.map_name, checksum = self.height_checksum(), "restored terrain changes");
        Ok(())
    }

    /// Render-side view of the terrain for external clients.
    pub fn snapshot(&self) -> TerrainSnapshot {
        let dims = self.field.dims();
        TerrainSnapshot {
            map_name: self.map_name.clone(),
            width: dims.mapx,
            height: dims.mapy,
            square_size: dims.square_size,
            heights: self.field.unsynced_corners().to_vec(),
            types: self.field.types.clone(),
            slope: self.field.slope.clone(),
            bounds: self.bounds.current(),
            height_checksum: self.height_checksum(),
        }
    }
}

/// ECS world driving a [`TerrainMap`] with a fixed simulation timestep.
///
/// The simulation schedule runs once per fixed tick; the render schedule
/// runs once per [`TerrainWorld::render_frame`] call.
pub struct TerrainWorld {
    world: World,
    sim_schedule: Schedule,
    render_schedule: Schedule,
    tick: u64,
    time_accumulator: f32,
}

impl TerrainWorld {
    pub fn new(map: TerrainMap) -> Self {
        let mut world = World::new();
        world.insert_resource(map);
        world.insert_resource(SimTick(0));
        world.insert_resource(UnsyncedUpdateLog::default());

        let mut sim_schedule = Schedule::default();
        sim_schedule.add_systems(terrain_bounds_system);

        let mut render_schedule = Schedule::default();
        render_schedule.add_systems(unsynced_heightmap_system);

        Self {
            world,
            sim_schedule,
            render_schedule,
            tick: 0,
            time_accumulator: 0.0,
        }
    }

    /// Step the simulation forward by `dt` seconds in fixed ticks.
    pub fn step(&mut self, dt: f32) {
        self.time_accumulator += dt;
        while self.time_accumulator >= FIXED_TIMESTEP {
            self.fixed_update();
            self.time_accumulator -= FIXED_TIMESTEP;
        }
    }

    /// Run exactly one simulation tick.
    pub fn fixed_update(&mut self) {
        if let Some(mut tick) = self.world.get_resource_mut::<SimTick>() {
            tick.increment();
        }
        self.sim_schedule.run(&mut self.world);
        self.tick += 1;
    }

    /// Propagate pending unsynced updates for one render frame.
    pub fn render_frame(&mut self) {
        self.render_schedule.run(&mut self.world);
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn map(&self) -> Option<&TerrainMap> {
        self.world.get_resource::<TerrainMap>()
    }

    pub fn map_mut(&mut self) -> Option<Mut<'_, TerrainMap>> {
        self.world.get_resource_mut::<TerrainMap>()
    }

    /// Rectangles propagated since the last call.
    pub fn take_updates(&mut self) -> Vec<Rect> {
        self.world
            .get_resource_mut::<UnsyncedUpdateLog>()
            .map(|mut log| log.take())
            .unwrap_or_default()
    }

    /// Get the render snapshot as a JSON string.
    pub fn snapshot_json(&self) -> String {
        self.map()
            .and_then(|map| map.snapshot().to_json().ok())
            .unwrap_or_else(|| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncMode;
    use crate::sync::{NullSink, RegionId};
    use crate::terrain::TerrainTypeInfo;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn config() -> TerrainConfig {
        TerrainConfig { mip_levels: 3, region_size: 4, ..Default::default() }
    }

    fn hills(size: usize) -> Vec<f32> {
        (0..(size + 1) * (size + 1))
            .map(|i| {
                let (x, z) = ((i % (size + 1)) as f32, (i / (size + 1)) as f32);
                (x * 0.7).sin() * 12.0 + (z * 0.3).cos() * 5.0 + 20.0
            })
            .collect()
    }

    fn loaded(size: usize) -> TerrainMap {
        let types = vec![1u8; (size / 2) * (size / 2)];
        let mut map = TerrainMap::load("test", size, size, &hills(size), Some(&types), config()).unwrap();
        map.drain_frame(usize::MAX, &mut NullSink);
        map
    }

    #[test]
    fn test_load_corner_scenario() {
        let config = TerrainConfig { mip_levels: 2, ..Default::default() };
        let mut map = TerrainMap::load("flat", 4, 4, &[0.0; 25], None, config).unwrap();
        assert_eq!(map.drain_frame(128, &mut NullSink), 1);

        map.write_synced_region(Rect::point(2, 2), &[10.0]).unwrap();
        map.update_synced(Rect::new(1, 1, 3, 3));

        for z in 0..4 {
            for x in 0..4 {
                let expected = if (1..=2).contains(&x) && (1..=2).contains(&z) { 2.5 } else { 0.0 };
                assert_eq!(map.field().read_center_height(x, z).unwrap(), expected);
            }
        }
        assert!(map.sync().is_pending(&Rect::new(1, 1, 3, 3)));
    }

    #[test]
    fn test_load_rejects_bad_input() {
        assert!(matches!(
            TerrainMap::load("m", 4, 4, &[0.0; 24], None, TerrainConfig { mip_levels: 1, ..Default::default() }),
            Err(TerrainError::SizeMismatch { expected: 25, actual: 24, .. })
        ));
        assert!(matches!(
            TerrainMap::load("m", 6, 6, &[0.0; 49], None, TerrainConfig::default()),
            Err(TerrainError::Configuration { .. })
        ));
        let zero_regions = TerrainConfig { mip_levels: 1, region_size: 0, ..Default::default() };
        assert!(TerrainMap::load("m", 4, 4, &[0.0; 25], None, zero_regions).is_err());
    }

    #[test]
    fn test_bad_type_grid_degrades() {
        let cfg = TerrainConfig { mip_levels: 1, ..Default::default() };
        let map = TerrainMap::load("m", 4, 4, &[0.0; 25], Some(&[1, 2, 3]), cfg.clone()).unwrap();
        assert!(map.field().type_map().iter().all(|&t| t == 0));

        let map = TerrainMap::load("m", 4, 4, &[0.0; 25], Some(&[2, 200, 4, 5]), cfg.clone()).unwrap();
        assert_eq!(map.field().type_map(), &[2, 0, 4, 5]);

        let map = TerrainMap::load("m", 4, 4, &[0.0; 25], Some(&[7, 8, 0, 3]), cfg).unwrap();
        assert_eq!(map.field().type_map(), &[7, 8, 0, 3]);
        assert_eq!(map.terrain_type_at(1, 0).unwrap(), Some(TerrainType::Rubble));
        assert_eq!(map.terrain_type_at(1, 1).unwrap(), Some(TerrainType::Crater));
        assert!(map.terrain_type_at(2, 0).is_err());
    }

    #[test]
    fn test_custom_palette_types_have_no_builtin() {
        let mut entries: Vec<TerrainTypeInfo> = TerrainType::ALL.iter().map(|&t| t.into()).collect();
        entries.push(TerrainTypeInfo { name: "ice".into(), hardness: 1.0, movement: 0.6, cover: 0.0 });
        let cfg = TerrainConfig { mip_levels: 1, ..Default::default() };
        let types = [9, 1, 9, 9];
        let map =
            TerrainMap::load_with_palette("m", 4, 4, &[0.0; 25], Some(&types), cfg, TerrainPalette::new(entries)).unwrap();
        assert_eq!(map.field().type_map(), &[9, 1, 9, 9]);
        assert_eq!(map.terrain_type_at(0, 0).unwrap(), None);
        assert_eq!(map.terrain_type_at(1, 0).unwrap(), Some(TerrainType::Rough));
    }

    #[test]
    fn test_initial_state_is_consistent() {
        let map = loaded(16);
        let field = map.field();
        assert_eq!(field.unsynced_corners(), field.synced_corners());
        assert_eq!(map.bounds().initial(), map.bounds().current());
        assert_eq!(map.baseline_checksum(), map.height_checksum());
        assert!(map.is_above_water());
    }

    #[test]
    fn test_checksum_tracks_value_changes() {
        let mut map = loaded(16);
        let before = map.height_checksum();
        assert_eq!(before, map.height_checksum());

        // rewriting the same value leaves the checksum alone
        let same = map.field().read_synced(3, 4).unwrap();
        map.set_heights(Rect::point(3, 4), &[same]).unwrap();
        assert_eq!(map.height_checksum(), before);

        map.set_heights(Rect::point(3, 4), &[same + 1.0]).unwrap();
        assert_ne!(map.height_checksum(), before);

        let types_before = map.type_checksum();
        map.set_type(0, 0, 7).unwrap();
        assert_ne!(map.type_checksum(), types_before);
        assert!(matches!(map.set_type(0, 0, 42), Err(TerrainError::UnknownTerrainType { id: 42, .. })));
    }

    #[test]
    fn test_visibility_flip_scenario() {
        let mut map = loaded(16);
        let visible = Arc::new(AtomicBool::new(false));
        let flag = visible.clone();
        map.set_visibility(move |id: RegionId| id != RegionId::new(2, 2) || flag.load(Ordering::Relaxed));

        map.set_heights(Rect::point(9, 9), &[99.0]).unwrap();
        let stale = map.field().read_unsynced(9, 9).unwrap();
        assert_ne!(stale, 99.0);

        for _ in 0..5 {
            map.drain_frame(128, &mut NullSink);
            assert_eq!(map.field().read_unsynced(9, 9).unwrap(), stale);
        }

        visible.store(true, Ordering::Relaxed);
        let mut seen = Vec::new();
        map.drain_frame(128, &mut seen);
        assert_eq!(seen, vec![Rect::point(9, 9)]);
        assert_eq!(map.field().read_unsynced(9, 9).unwrap(), 99.0);
    }

    #[test]
    fn test_hidden_edits_survive_digest_wraparound() {
        let mut map = loaded(16);
        let visible = Arc::new(AtomicBool::new(false));
        let flag = visible.clone();
        map.set_visibility(move |id: RegionId| id != RegionId::new(1, 1) || flag.load(Ordering::Relaxed));

        for i in 0..256 {
            map.set_heights(Rect::point(5, 5), &[i as f32]).unwrap();
        }
        assert_eq!(map.sync().deferred_len(), 1);

        visible.store(true, Ordering::Relaxed);
        map.drain_frame(128, &mut NullSink);
        assert_eq!(map.field().read_unsynced(5, 5).unwrap(), 255.0);
        assert_eq!(map.field().unsynced_corners(), map.field().synced_corners());
    }

    #[test]
    fn test_reveal_propagates_deferred_region() {
        let mut map = loaded(16);
        map.set_visibility(|_: RegionId| false);
        map.set_heights(Rect::point(1, 1), &[50.0]).unwrap();
        assert_eq!(map.sync().deferred_len(), 1);

        map.set_visibility(AlwaysObserved);
        map.reveal(Rect::new(0, 0, 3, 3));
        assert_eq!(map.sync().deferred_len(), 0);
        assert_eq!(map.drain_frame(128, &mut NullSink), 1);
        assert_eq!(map.field().read_unsynced(1, 1).unwrap(), 50.0);
    }

    #[test]
    fn test_copy_synced_to_unsynced() {
        let mut map = loaded(16);
        map.set_visibility(|_: RegionId| false);
        map.set_heights(Rect::new(2, 2, 3, 3), &[7.0; 4]).unwrap();

        let mut seen = Vec::new();
        map.copy_synced_to_unsynced(&mut seen);
        assert_eq!(seen, vec![Rect::new(0, 0, 16, 16)]);
        assert_eq!(map.field().unsynced_corners(), map.field().synced_corners());
        assert_eq!(map.field().unsynced_face_normals(), map.field().synced_face_normals());
        assert_eq!(map.sync().deferred_len(), 0);
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let mut map = loaded(16);
        map.set_heights(Rect::new(0, 0, 1, 0), &[-4.0, -4.5]).unwrap();
        let match_checksum = map.begin_match();
        map.set_heights(Rect::new(10, 10, 11, 11), &[30.0, 31.0, 32.0, 33.0]).unwrap();
        map.set_type(3, 3, 5).unwrap();

        let delta = map.save_changes().unwrap();
        assert_eq!(delta.before_match.iter().filter(|&&w| w != 0).count(), 2);
        let json = delta.to_json().unwrap();

        let mut restored = loaded(16);
        restored.restore_changes(&TerrainDelta::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.height_checksum(), map.height_checksum());
        assert_eq!(restored.type_checksum(), map.type_checksum());
        assert_eq!(
            checksum::height_checksum(restored.field().original_heights(), "test"),
            match_checksum
        );
        assert_eq!(restored.field().center_heights(), map.field().center_heights());
        assert_eq!(restored.field().slope_map(), map.field().slope_map());
    }

    #[test]
    fn test_restore_rejects_foreign_payload() {
        let mut map = loaded(16);
        let before = map.height_checksum();
        let delta = TerrainDelta { before_match: vec![0; 3], during_match: vec![0; 3], types: vec![] };
        assert!(map.restore_changes(&delta).is_err());
        assert_eq!(map.height_checksum(), before);
    }

    #[test]
    fn test_aliased_map_notifies_without_copy() {
        let cfg = TerrainConfig { sync_mode: SyncMode::Aliased, ..config() };
        let mut map = TerrainMap::load("a", 8, 8, &hills(8), None, cfg).unwrap();
        map.set_visibility(|_: RegionId| false);
        map.drain_frame(128, &mut NullSink);

        map.set_heights(Rect::point(4, 4), &[20.0]).unwrap();
        assert_eq!(map.field().read_unsynced(4, 4).unwrap(), 20.0);
        let mut seen = Vec::new();
        assert_eq!(map.drain_frame(128, &mut seen), 1);
        assert_eq!(seen, vec![Rect::point(4, 4)]);
    }

    #[test]
    fn test_world_paces_bounds_and_drains() {
        let mut world = TerrainWorld::new(loaded(16));
        world.map_mut().unwrap().set_heights(Rect::point(5, 5), &[500.0]).unwrap();

        world.render_frame();
        assert_eq!(world.take_updates(), vec![Rect::point(5, 5)]);
        assert!(world.take_updates().is_empty());

        // two full pacing cycles guarantee one committed scan after the edit
        for _ in 0..60 {
            world.fixed_update();
        }
        assert_eq!(world.tick(), 60);
        assert_eq!(world.map().unwrap().bounds().current().max, 500.0);
    }

    #[test]
    fn test_snapshot_json() {
        let world = TerrainWorld::new(loaded(8));
        let json = world.snapshot_json();
        assert!(json.contains("\"map_name\":\"test\""));
        assert!(json.contains("height_checksum"));
    }
}
