//! Deterministic fingerprints and XOR-delta persistence.
//!
//! Checksums fold raw bit patterns in fixed row-major order, so every
//! instance holding the same grid and map name computes the same value.
//! They must be computed on one thread.
//!
//! Delta payloads store `current XOR reference` per element; untouched
//! terrain becomes long runs of zero words that compress well.

use crate::error::{TerrainError, TerrainResult};
use crate::terrain::TerrainPalette;
use serde::{Deserialize, Serialize};

const FNV_OFFSET: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Order-dependent 32-bit running hash (FNV-1a, seeded).
#[derive(Debug, Clone, Copy)]
pub struct LiteHasher {
    state: u32,
}

impl Default for LiteHasher {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl LiteHasher {
    pub fn with_seed(seed: u32) -> Self {
        Self { state: seed ^ FNV_OFFSET }
    }

    #[inline]
    pub fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u32::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write(&value.to_bits().to_le_bytes());
    }

    pub fn write_str(&mut self, value: &str) {
        self.write(value.as_bytes());
    }

    #[must_use]
    pub fn finish(&self) -> u32 {
        self.state
    }
}

/// Hash `bytes` continuing from `seed`.
#[must_use]
pub fn lite_hash(bytes: &[u8], seed: u32) -> u32 {
    let mut hasher = LiteHasher::with_seed(seed);
    hasher.write(bytes);
    hasher.finish()
}

/// Fingerprint of a corner grid together with the map identity.
#[must_use]
pub fn height_checksum(corners: &[f32], map_name: &str) -> u32 {
    let mut hasher = LiteHasher::default();
    for &h in corners {
        hasher.write_f32(h);
    }
    hasher.write_str(map_name);
    hasher.finish()
}

/// Fingerprint of the type grid, the palette it indexes and the map identity.
#[must_use]
pub fn type_checksum(types: &[u8], palette: &TerrainPalette, map_name: &str) -> u32 {
    let mut hasher = LiteHasher::default();
    hasher.write(types);
    for entry in palette.entries() {
        hasher.write_str(&entry.name);
        hasher.write_f32(entry.hardness);
        hasher.write_f32(entry.movement);
        hasher.write_f32(entry.cover);
    }
    hasher.write_str(map_name);
    hasher.finish()
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> TerrainResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(TerrainError::SizeMismatch { what, expected, actual })
    }
}

/// Per-element `current XOR reference` of two height grids, as 32-bit words.
pub fn xor_height_delta(reference: &[f32], current: &[f32]) -> TerrainResult<Vec<i32>> {
    check_len("height delta", reference.len(), current.len())?;
    Ok(reference
        .iter()
        .zip(current)
        .map(|(r, c)| (r.to_bits() ^ c.to_bits()) as i32)
        .collect())
}

/// Rebuild a height grid from its reference and a delta into `out`.
pub fn apply_height_delta(reference: &[f32], delta: &[i32], out: &mut [f32]) -> TerrainResult<()> {
    check_len("height delta", reference.len(), delta.len())?;
    check_len("height delta output", reference.len(), out.len())?;
    for ((o, r), d) in out.iter_mut().zip(reference).zip(delta) {
        *o = f32::from_bits(r.to_bits() ^ *d as u32);
    }
    Ok(())
}

pub fn xor_type_delta(reference: &[u8], current: &[u8]) -> TerrainResult<Vec<u8>> {
    check_len("type delta", reference.len(), current.len())?;
    Ok(reference.iter().zip(current).map(|(r, c)| r ^ c).collect())
}

pub fn apply_type_delta(reference: &[u8], delta: &[u8], out: &mut [u8]) -> TerrainResult<()> {
    check_len("type delta", reference.len(), delta.len())?;
    check_len("type delta output", reference.len(), out.len())?;
    for ((o, r), d) in out.iter_mut().zip(reference).zip(delta) {
        *o = r ^ d;
    }
    Ok(())
}

/// Persisted terrain edits.
///
/// - `before_match`: original heights against the heights loaded from the map
///   (pre-game modifications)
/// - `during_match`: current synced heights against the original ones
/// - `types`: current type grid against the loaded one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainDelta {
    pub before_match: Vec<i32>,
    pub during_match: Vec<i32>,
    pub types: Vec<u8>,
}

impl TerrainDelta {
    /// Number of non-zero words, i.e. elements that differ from their reference.
    pub fn changed_words(&self) -> usize {
        self.before_match.iter().filter(|&&w| w != 0).count()
            + self.during_match.iter().filter(|&&w| w != 0).count()
            + self.types.iter().filter(|&&b| b != 0).count()
    }

    pub fn to_json(&self) -> TerrainResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> TerrainResult<Self> {
        Ok(serde_json::from_str(data)?)
    }
}
