//! Error types for the terrain engine.

use thiserror::Error;

/// Errors raised by terrain operations.
///
/// Every variant is a logic or configuration error. Nothing here is
/// transient, so callers should propagate rather than retry.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// Map dimensions are unusable with the configured mip pyramid.
    #[error("invalid terrain dimensions {width}x{height}: {reason}")]
    Configuration {
        /// Requested width in squares
        width: usize,
        /// Requested height in squares
        height: usize,
        /// Why the dimensions were rejected
        reason: String,
    },

    /// Grid coordinates outside the addressed grid.
    #[error("{grid} coordinate ({x}, {z}) out of bounds for {width}x{height} grid")]
    OutOfBounds {
        /// Name of the grid that was addressed
        grid: &'static str,
        /// X coordinate
        x: i64,
        /// Z coordinate
        z: i64,
        /// Grid width
        width: usize,
        /// Grid height
        height: usize,
    },

    /// Mip level outside the pyramid.
    #[error("mip level {level} out of bounds (pyramid has {levels} levels)")]
    MipLevelOutOfBounds {
        /// Requested level
        level: usize,
        /// Number of levels including level 0
        levels: usize,
    },

    /// Input buffer length does not match the addressed region.
    #[error("{what} size mismatch: expected {expected} values, got {actual}")]
    SizeMismatch {
        /// Which buffer was wrong
        what: &'static str,
        /// Expected element count
        expected: usize,
        /// Element count received
        actual: usize,
    },

    /// Type id with no entry in the terrain palette.
    #[error("terrain type {id} not in palette of {palette_len} entries")]
    UnknownTerrainType {
        /// Offending id
        id: u8,
        /// Number of palette entries
        palette_len: usize,
    },

    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for terrain operations.
pub type TerrainResult<T> = Result<T, TerrainError>;
