//! Per-tick and per-frame terrain systems.
//!
//! ## Parallelism Notes
//! - `terrain_bounds_system`: writes `TerrainMap`, reads `SimTick`. Runs on
//!   the simulation schedule.
//! - `unsynced_heightmap_system`: writes `TerrainMap` and
//!   `UnsyncedUpdateLog`. Runs on the render schedule, never concurrently
//!   with a synced update.

use crate::api::TerrainMap;
use crate::rect::Rect;
use crate::sync::UnsyncedUpdateSink;
use bevy_ecs::prelude::*;

/// Global simulation tick counter.
/// Increments each fixed update and selects the paced bounds slice.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Rectangles whose unsynced data was refreshed, in drain order.
#[derive(Resource, Debug, Clone, Default)]
pub struct UnsyncedUpdateLog {
    rects: Vec<Rect>,
    /// Total notifications received since creation.
    pub total: u64,
}

impl UnsyncedUpdateLog {
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn take(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.rects)
    }
}

impl UnsyncedUpdateSink for UnsyncedUpdateLog {
    fn on_unsynced_region_updated(&mut self, rect: Rect) {
        self.rects.push(rect);
        self.total += 1;
    }
}

/// Fold this tick's slice of the synced grid into the height bounds.
pub fn terrain_bounds_system(tick: Res<SimTick>, mut map: ResMut<TerrainMap>) {
    map.advance_bounds(tick.0);
}

/// Propagate at most `max_rects_per_frame` queued rectangles to the
/// unsynced view.
pub fn unsynced_heightmap_system(mut map: ResMut<TerrainMap>, mut log: ResMut<UnsyncedUpdateLog>) {
    let max_rects = map.config().max_rects_per_frame;
    map.drain_frame(max_rects, &mut *log);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use crate::sync::NullSink;

    fn world_with_map(max_rects: usize) -> World {
        let config = TerrainConfig { mip_levels: 1, region_size: 2, max_rects_per_frame: max_rects, ..Default::default() };
        let mut map = TerrainMap::load("systems", 8, 8, &[1.0; 81], None, config).unwrap();
        map.drain_frame(usize::MAX, &mut NullSink);

        let mut world = World::new();
        world.insert_resource(map);
        world.insert_resource(SimTick(0));
        world.insert_resource(UnsyncedUpdateLog::default());
        world
    }

    #[test]
    fn test_sim_tick_wraps() {
        let mut tick = SimTick(u64::MAX);
        tick.increment();
        assert_eq!(tick.0, 0);
    }

    #[test]
    fn test_unsynced_system_respects_frame_cap() {
        let mut world = world_with_map(2);
        {
            let mut map = world.resource_mut::<TerrainMap>();
            for x in [0, 3, 6] {
                map.set_heights(Rect::point(x, 0), &[5.0]).unwrap();
            }
        }

        let mut schedule = Schedule::default();
        schedule.add_systems(unsynced_heightmap_system);

        schedule.run(&mut world);
        assert_eq!(world.resource::<UnsyncedUpdateLog>().rects().len(), 2);
        schedule.run(&mut world);
        assert_eq!(world.resource::<UnsyncedUpdateLog>().rects().len(), 3);
        schedule.run(&mut world);
        assert_eq!(world.resource::<UnsyncedUpdateLog>().total, 3);
    }

    #[test]
    fn test_bounds_system_commits_after_cycle() {
        let mut world = world_with_map(128);
        world.resource_mut::<TerrainMap>().set_heights(Rect::point(4, 4), &[-3.0]).unwrap();

        let mut schedule = Schedule::default();
        schedule.add_systems(terrain_bounds_system);

        let period = world.resource::<TerrainMap>().config().pacing_period;
        for tick in 0..=period {
            world.resource_mut::<SimTick>().0 = tick;
            schedule.run(&mut world);
        }
        let map = world.resource::<TerrainMap>();
        assert_eq!(map.bounds().current().min, -3.0);
        assert!(!map.is_above_water());
    }
}
