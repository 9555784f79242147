//! This Bitter Ground - Terrain Height-Field Engine
//!
//! Authoritative terrain elevation for a deterministic, fixed-timestep RTS
//! simulation: corner heightmap, derived surfaces (center heights, mip
//! pyramid, normals, slope), visibility-gated propagation to a render-side
//! copy, running height bounds, checksums and XOR-delta persistence.
//! Uses `bevy_ecs` to drive the per-tick and per-frame work.

pub mod api;
pub mod bounds;
pub mod checksum;
pub mod config;
pub mod error;
pub mod heightfield;
pub mod pipeline;
pub mod rect;
pub mod sync;
pub mod systems;
pub mod terrain;

pub use api::{TerrainMap, TerrainWorld};
pub use bounds::{BoundsTracker, HeightBounds};
pub use checksum::TerrainDelta;
pub use config::{SyncMode, TerrainConfig};
pub use error::{TerrainError, TerrainResult};
pub use heightfield::{HeightField, MapDims};
pub use rect::Rect;
pub use sync::{
    AlwaysChanged, AlwaysObserved, ChangeDigestTracker, FnSink, RegionDigests, RegionId, RegionState, UnsyncedUpdateSink,
    VisibilityOracle,
};
pub use systems::*;
pub use terrain::{TerrainPalette, TerrainSnapshot, TerrainType, TerrainTypeInfo};
