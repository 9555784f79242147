//! Terrain engine configuration.

use serde::{Deserialize, Serialize};

/// How the unsynced (render-side) heightmap is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Unsynced views resolve to the synced buffers; propagation only notifies.
    Aliased,
    /// Unsynced heights and normals live in their own buffers and lag behind
    /// the synced ones until drained.
    #[default]
    Dual,
}

/// Configuration for the terrain height-field engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// World-space size of one map square (used as the normal's up component).
    pub square_size: f32,
    /// Number of mip levels including level 0 (the center heightmap).
    pub mip_levels: usize,
    /// Storage strategy for the unsynced heightmap.
    pub sync_mode: SyncMode,
    /// Side length, in squares, of one visibility region.
    pub region_size: usize,
    /// Maximum unsynced rectangles propagated per render frame.
    pub max_rects_per_frame: usize,
    /// Number of simulation ticks one paced bounds scan is spread across.
    pub pacing_period: u64,
    /// Skip propagating regions whose content has not changed since last sync.
    pub track_digests: bool,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            square_size: 8.0,
            mip_levels: 7,
            sync_mode: SyncMode::Dual,
            region_size: 8,
            max_rects_per_frame: 128,
            pacing_period: 30, // one second at 30 Hz
            track_digests: true,
        }
    }
}

impl TerrainConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Serialize the configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = TerrainConfig::from_json(r#"{ "mip_levels": 3, "sync_mode": "Aliased" }"#).unwrap();
        assert_eq!(config.mip_levels, 3);
        assert_eq!(config.sync_mode, SyncMode::Aliased);
        assert_eq!(config.max_rects_per_frame, 128);
        assert_eq!(config.pacing_period, 30);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = TerrainConfig {
            region_size: 4,
            track_digests: false,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(TerrainConfig::from_json(&json).unwrap(), config);
    }
}
