//! Terrain types and the render snapshot.
//!
//! The type grid stores one `u8` id per slope cell. Ids index into a
//! [`TerrainPalette`]; the palette's contents are part of the type checksum,
//! so two instances only agree when they run the same type definitions.

use crate::bounds::HeightBounds;
use serde::{Deserialize, Serialize};

/// Built-in terrain types. The discriminant is the type-grid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerrainType {
    /// Open ground - normal movement, no cover.
    #[default]
    Open = 0,
    /// Rough terrain - slower movement, light cover.
    Rough = 1,
    /// Mud - very slow movement, no cover.
    Mud = 2,
    /// Crater - slow movement, good cover.
    Crater = 3,
    /// Trench - normal movement, excellent cover.
    Trench = 4,
    /// Water - very slow.
    Water = 5,
    /// Road - fast movement, no cover.
    Road = 6,
    /// Forest - slow movement, good cover.
    Forest = 7,
    /// Rubble - slow movement, moderate cover.
    Rubble = 8,
}

impl TerrainType {
    pub const ALL: [TerrainType; 9] = [
        TerrainType::Open,
        TerrainType::Rough,
        TerrainType::Mud,
        TerrainType::Crater,
        TerrainType::Trench,
        TerrainType::Water,
        TerrainType::Road,
        TerrainType::Forest,
        TerrainType::Rubble,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            TerrainType::Open => "open",
            TerrainType::Rough => "rough",
            TerrainType::Mud => "mud",
            TerrainType::Crater => "crater",
            TerrainType::Trench => "trench",
            TerrainType::Water => "water",
            TerrainType::Road => "road",
            TerrainType::Forest => "forest",
            TerrainType::Rubble => "rubble",
        }
    }

    /// Movement speed multiplier for this terrain type.
    pub fn movement_multiplier(self) -> f32 {
        match self {
            TerrainType::Open => 1.0,
            TerrainType::Rough => 0.7,
            TerrainType::Mud => 0.4,
            TerrainType::Crater => 0.6,
            TerrainType::Trench => 0.9,
            TerrainType::Water => 0.2,
            TerrainType::Road => 1.3,
            TerrainType::Forest => 0.6,
            TerrainType::Rubble => 0.5,
        }
    }

    /// Resistance to deformation (1.0 = default ground).
    pub fn hardness(self) -> f32 {
        match self {
            TerrainType::Road => 2.0,
            TerrainType::Rubble | TerrainType::Forest => 1.5,
            TerrainType::Mud | TerrainType::Water => 0.5,
            TerrainType::Crater => 0.8,
            _ => 1.0,
        }
    }

    /// Cover value provided by this terrain (0.0 = none, 1.0 = full).
    pub fn cover_value(self) -> f32 {
        match self {
            TerrainType::Open => 0.0,
            TerrainType::Rough => 0.2,
            TerrainType::Mud => 0.0,
            TerrainType::Crater => 0.5,
            TerrainType::Trench => 0.8,
            TerrainType::Water => 0.0,
            TerrainType::Road => 0.0,
            TerrainType::Forest => 0.4,
            TerrainType::Rubble => 0.3,
        }
    }
}

/// Parameters of one palette entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainTypeInfo {
    pub name: String,
    pub hardness: f32,
    pub movement: f32,
    pub cover: f32,
}

impl From<TerrainType> for TerrainTypeInfo {
    fn from(t: TerrainType) -> Self {
        Self {
            name: t.name().to_string(),
            hardness: t.hardness(),
            movement: t.movement_multiplier(),
            cover: t.cover_value(),
        }
    }
}

/// Mapping from type-grid id to terrain parameters (at most 256 entries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainPalette {
    entries: Vec<TerrainTypeInfo>,
}

impl Default for TerrainPalette {
    fn default() -> Self {
        Self {
            entries: TerrainType::ALL.iter().map(|&t| t.into()).collect(),
        }
    }
}

impl TerrainPalette {
    /// Custom palette; anything past id 255 is unreachable and dropped.
    pub fn new(mut entries: Vec<TerrainTypeInfo>) -> Self {
        entries.truncate(256);
        Self { entries }
    }

    pub fn get(&self, id: u8) -> Option<&TerrainTypeInfo> {
        self.entries.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TerrainTypeInfo] {
        &self.entries
    }

    /// Whether every id in `types` names a palette entry.
    pub fn covers(&self, types: &[u8]) -> bool {
        types.iter().all(|&id| (id as usize) < self.entries.len())
    }
}

/// Snapshot of terrain for serialization to the render client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainSnapshot {
    pub map_name: String,
    /// Width in squares.
    pub width: usize,
    /// Height in squares.
    pub height: usize,
    pub square_size: f32,
    /// Flattened unsynced corner heights, `(width + 1) * (height + 1)`.
    pub heights: Vec<f32>,
    /// Flattened terrain type ids at half resolution.
    pub types: Vec<u8>,
    /// Flattened flatness values at half resolution.
    pub slope: Vec<f32>,
    pub bounds: HeightBounds,
    pub height_checksum: u32,
}

impl TerrainSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_roundtrip() {
        for t in TerrainType::ALL {
            assert_eq!(TerrainType::from_id(t.id()), Some(t));
        }
        assert_eq!(TerrainType::from_id(9), None);
    }

    #[test]
    fn test_movement_multiplier() {
        assert_eq!(TerrainType::Open.movement_multiplier(), 1.0);
        assert!(TerrainType::Mud.movement_multiplier() < 1.0);
        assert!(TerrainType::Road.movement_multiplier() > 1.0);
    }

    #[test]
    fn test_default_palette_matches_builtin_types() {
        let palette = TerrainPalette::default();
        assert_eq!(palette.len(), TerrainType::ALL.len());
        assert_eq!(palette.get(TerrainType::Forest.id()).unwrap().name, "forest");
        assert!(palette.covers(&[0, 8, 3]));
        assert!(!palette.covers(&[0, 9]));
    }
}
