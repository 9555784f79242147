//! ECS systems for the terrain engine.
//!
//! **Simulation schedule** (once per fixed tick):
//! - `terrain_bounds_system` - paced min/max scan of the synced grid
//!
//! **Render schedule** (once per frame):
//! - `unsynced_heightmap_system` - bounded synced-to-unsynced propagation

pub mod heightmap;

pub use heightmap::*;
