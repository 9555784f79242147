//! Height-field storage: corner heights, derived grids and normals.
//!
//! The map is `mapx` x `mapy` squares. Heights are stored per square corner,
//! so corner grids are `(mapx + 1) x (mapy + 1)`. Everything else (center
//! heights, mips, normals, slope) is derived from the synced corner grid by
//! [`crate::pipeline`]. All grids are row-major with `z` as the row index.
//!
//! Accessors only read; they never recompute. Synced and unsynced views can
//! diverge until pending updates are drained.

use crate::config::{SyncMode, TerrainConfig};
use crate::error::{TerrainError, TerrainResult};
use crate::rect::Rect;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Fixed map dimensions, established once at load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapDims {
    /// Width in squares.
    pub mapx: usize,
    /// Height in squares.
    pub mapy: usize,
    /// World-space size of one square.
    pub square_size: f32,
}

impl MapDims {
    #[inline]
    pub fn mapxp1(&self) -> usize {
        self.mapx + 1
    }

    #[inline]
    pub fn mapyp1(&self) -> usize {
        self.mapy + 1
    }

    /// Slope/type grid width (half resolution).
    #[inline]
    pub fn hmapx(&self) -> usize {
        self.mapx / 2
    }

    /// Slope/type grid height (half resolution).
    #[inline]
    pub fn hmapy(&self) -> usize {
        self.mapy / 2
    }

    pub fn corner_count(&self) -> usize {
        self.mapxp1() * self.mapyp1()
    }

    pub fn square_count(&self) -> usize {
        self.mapx * self.mapy
    }

    pub fn half_count(&self) -> usize {
        self.hmapx() * self.hmapy()
    }

    #[inline]
    pub fn corner_index(&self, x: usize, z: usize) -> usize {
        z * self.mapxp1() + x
    }

    #[inline]
    pub fn square_index(&self, x: usize, z: usize) -> usize {
        z * self.mapx + x
    }

    /// The whole corner grid as an inclusive rectangle.
    pub fn corner_rect(&self) -> Rect {
        Rect::new(0, 0, self.mapx as i32, self.mapy as i32)
    }

    /// Radius of the circle enclosing the map in world units.
    pub fn bounding_radius(&self) -> f32 {
        let w = self.mapx as f32 * self.square_size;
        let h = self.mapy as f32 * self.square_size;
        (w * w + h * h).sqrt() * 0.5
    }
}

/// Heights and normals that exist once per view (synced or unsynced).
#[derive(Debug, Clone)]
pub(crate) struct SurfaceBuffers {
    pub(crate) corners: Vec<f32>,
    pub(crate) face_normals: Vec<Vec3>,
    pub(crate) center_normals: Vec<Vec3>,
}

impl SurfaceBuffers {
    fn flat(dims: &MapDims) -> Self {
        Self {
            corners: vec![0.0; dims.corner_count()],
            face_normals: vec![Vec3::Y; dims.square_count() * 2],
            center_normals: vec![Vec3::Y; dims.square_count()],
        }
    }
}

/// Storage strategy for the unsynced view, chosen once at initialization.
#[derive(Debug, Clone)]
pub(crate) enum UnsyncedStore {
    /// Unsynced reads resolve to the synced buffers.
    Aliased,
    /// Separate render-side copy.
    Dual(SurfaceBuffers),
}

/// Owner of every terrain grid.
#[derive(Debug, Clone)]
pub struct HeightField {
    pub(crate) dims: MapDims,
    pub(crate) mip_levels: usize,
    pub(crate) synced: SurfaceBuffers,
    pub(crate) unsynced: UnsyncedStore,
    pub(crate) center_heights: Vec<f32>,
    /// Mip levels `1..mip_levels`; level 0 is `center_heights`.
    pub(crate) mips: Vec<Vec<f32>>,
    pub(crate) center_normals_2d: Vec<Vec2>,
    /// Shading normals per corner, derived from the unsynced face normals.
    pub(crate) vertex_normals: Vec<Vec3>,
    pub(crate) slope: Vec<f32>,
    pub(crate) types: Vec<u8>,
    /// Heights exactly as handed over by the loader.
    pub(crate) map_file_heights: Vec<f32>,
    /// Heights at match start (after pre-game modifications).
    pub(crate) original_heights: Vec<f32>,
}

impl HeightField {
    /// Allocate every grid for a `width` x `height` square map, flat at zero.
    pub fn new(width: usize, height: usize, config: &TerrainConfig) -> TerrainResult<Self> {
        let reject = |reason: String| TerrainError::Configuration { width, height, reason };

        if width == 0 || height == 0 {
            return Err(reject("map must have at least one square per axis".into()));
        }
        if !(config.square_size > 0.0) {
            return Err(reject(format!("square size {} must be positive", config.square_size)));
        }
        if config.mip_levels == 0 {
            return Err(reject("mip pyramid needs at least one level".into()));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(reject("slope grid requires even dimensions".into()));
        }
        let shift = config.mip_levels - 1;
        if shift >= usize::BITS as usize {
            return Err(reject(format!("{} mip levels is not representable", config.mip_levels)));
        }
        let divisor = 1usize << shift;
        if width % divisor != 0 || height % divisor != 0 {
            return Err(reject(format!(
                "dimensions must be divisible by {} for {} mip levels",
                divisor, config.mip_levels
            )));
        }

        let dims = MapDims { mapx: width, mapy: height, square_size: config.square_size };
        let synced = SurfaceBuffers::flat(&dims);
        let unsynced = match config.sync_mode {
            SyncMode::Aliased => UnsyncedStore::Aliased,
            SyncMode::Dual => UnsyncedStore::Dual(synced.clone()),
        };
        let mips = (1..config.mip_levels)
            .map(|i| vec![0.0; (width >> i) * (height >> i)])
            .collect();

        Ok(Self {
            dims,
            mip_levels: config.mip_levels,
            synced,
            unsynced,
            center_heights: vec![0.0; dims.square_count()],
            mips,
            center_normals_2d: vec![Vec2::ZERO; dims.square_count()],
            vertex_normals: vec![Vec3::Y; dims.corner_count()],
            slope: vec![1.0; dims.half_count()],
            types: vec![0; dims.half_count()],
            map_file_heights: vec![0.0; dims.corner_count()],
            original_heights: vec![0.0; dims.corner_count()],
        })
    }

    pub fn dims(&self) -> &MapDims {
        &self.dims
    }

    /// Number of mip levels including level 0.
    pub fn mip_levels(&self) -> usize {
        self.mip_levels
    }

    /// Approximate heap memory held by all grids, in bytes.
    pub fn footprint_bytes(&self) -> usize {
        use std::mem::size_of;
        let surface = |b: &SurfaceBuffers| {
            b.corners.len() * size_of::<f32>() + (b.face_normals.len() + b.center_normals.len()) * size_of::<Vec3>()
        };
        let unsynced = match &self.unsynced {
            UnsyncedStore::Aliased => 0,
            UnsyncedStore::Dual(buffers) => surface(buffers),
        };
        let floats = self.center_heights.len()
            + self.mips.iter().map(Vec::len).sum::<usize>()
            + self.slope.len()
            + self.map_file_heights.len()
            + self.original_heights.len();

        surface(&self.synced)
            + unsynced
            + floats * size_of::<f32>()
            + self.center_normals_2d.len() * size_of::<Vec2>()
            + self.vertex_normals.len() * size_of::<Vec3>()
            + self.types.len()
    }

    pub fn sync_mode(&self) -> SyncMode {
        match self.unsynced {
            UnsyncedStore::Aliased => SyncMode::Aliased,
            UnsyncedStore::Dual(_) => SyncMode::Dual,
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Overwrite synced corner heights inside `rect` (inclusive corner bounds).
    ///
    /// `values` is row-major over the rectangle. Derived buffers are left
    /// stale; run the pipeline over the same rectangle afterwards.
    pub fn write_synced_region(&mut self, rect: Rect, values: &[f32]) -> TerrainResult<()> {
        self.check_corner_rect(rect)?;
        if values.len() != rect.area() {
            return Err(TerrainError::SizeMismatch {
                what: "corner region",
                expected: rect.area(),
                actual: values.len(),
            });
        }

        let width = rect.width();
        for (row, z) in (rect.z1..=rect.z2).enumerate() {
            let start = self.dims.corner_index(rect.x1 as usize, z as usize);
            self.synced.corners[start..start + width]
                .copy_from_slice(&values[row * width..(row + 1) * width]);
        }
        Ok(())
    }

    /// Set the terrain type of one slope-grid cell.
    pub fn set_type(&mut self, x: usize, z: usize, type_id: u8) -> TerrainResult<()> {
        let idx = check("type", x, z, self.dims.hmapx(), self.dims.hmapy())?;
        self.types[idx] = type_id;
        Ok(())
    }

    pub(crate) fn check_corner_rect(&self, rect: Rect) -> TerrainResult<()> {
        let (w, h) = (self.dims.mapxp1(), self.dims.mapyp1());
        let bad = |x: i32, z: i32| TerrainError::OutOfBounds {
            grid: "corner",
            x: x.into(),
            z: z.into(),
            width: w,
            height: h,
        };
        if rect.x1 < 0 || rect.z1 < 0 || rect.is_empty() {
            return Err(bad(rect.x1, rect.z1));
        }
        if rect.x2 as usize >= w || rect.z2 as usize >= h {
            return Err(bad(rect.x2, rect.z2));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bounds-checked reads
    // ------------------------------------------------------------------

    pub fn read_synced(&self, x: usize, z: usize) -> TerrainResult<f32> {
        let idx = check("corner", x, z, self.dims.mapxp1(), self.dims.mapyp1())?;
        Ok(self.synced.corners[idx])
    }

    pub fn read_unsynced(&self, x: usize, z: usize) -> TerrainResult<f32> {
        let idx = check("corner", x, z, self.dims.mapxp1(), self.dims.mapyp1())?;
        Ok(self.unsynced_corners()[idx])
    }

    pub fn read_center_height(&self, x: usize, z: usize) -> TerrainResult<f32> {
        let idx = check("center", x, z, self.dims.mapx, self.dims.mapy)?;
        Ok(self.center_heights[idx])
    }

    /// Read a mip cell; level 0 is the center heightmap.
    pub fn read_mip(&self, level: usize, x: usize, z: usize) -> TerrainResult<f32> {
        let grid = self.mip_level(level).ok_or(TerrainError::MipLevelOutOfBounds {
            level,
            levels: self.mip_levels,
        })?;
        let idx = check("mip", x, z, self.dims.mapx >> level, self.dims.mapy >> level)?;
        Ok(grid[idx])
    }

    pub fn read_slope(&self, x: usize, z: usize) -> TerrainResult<f32> {
        let idx = check("slope", x, z, self.dims.hmapx(), self.dims.hmapy())?;
        Ok(self.slope[idx])
    }

    pub fn read_type(&self, x: usize, z: usize) -> TerrainResult<u8> {
        let idx = check("type", x, z, self.dims.hmapx(), self.dims.hmapy())?;
        Ok(self.types[idx])
    }

    /// Synced `(top_left, bottom_right)` triangle normals of a square.
    pub fn read_face_normals(&self, x: usize, z: usize) -> TerrainResult<(Vec3, Vec3)> {
        let idx = check("face normal", x, z, self.dims.mapx, self.dims.mapy)?;
        Ok((self.synced.face_normals[idx * 2], self.synced.face_normals[idx * 2 + 1]))
    }

    pub fn read_center_normal(&self, x: usize, z: usize) -> TerrainResult<Vec3> {
        let idx = check("center normal", x, z, self.dims.mapx, self.dims.mapy)?;
        Ok(self.synced.center_normals[idx])
    }

    /// Render-side shading normal of a corner.
    pub fn read_vertex_normal(&self, x: usize, z: usize) -> TerrainResult<Vec3> {
        let idx = check("vertex normal", x, z, self.dims.mapxp1(), self.dims.mapyp1())?;
        Ok(self.vertex_normals[idx])
    }

    // ------------------------------------------------------------------
    // Bulk views
    // ------------------------------------------------------------------

    pub fn synced_corners(&self) -> &[f32] {
        &self.synced.corners
    }

    pub fn unsynced_corners(&self) -> &[f32] {
        match &self.unsynced {
            UnsyncedStore::Aliased => &self.synced.corners,
            UnsyncedStore::Dual(buffers) => &buffers.corners,
        }
    }

    pub fn synced_face_normals(&self) -> &[Vec3] {
        &self.synced.face_normals
    }

    pub fn unsynced_face_normals(&self) -> &[Vec3] {
        match &self.unsynced {
            UnsyncedStore::Aliased => &self.synced.face_normals,
            UnsyncedStore::Dual(buffers) => &buffers.face_normals,
        }
    }

    pub fn unsynced_center_normals(&self) -> &[Vec3] {
        match &self.unsynced {
            UnsyncedStore::Aliased => &self.synced.center_normals,
            UnsyncedStore::Dual(buffers) => &buffers.center_normals,
        }
    }

    pub fn center_heights(&self) -> &[f32] {
        &self.center_heights
    }

    pub fn center_normals_2d(&self) -> &[Vec2] {
        &self.center_normals_2d
    }

    pub fn vertex_normals(&self) -> &[Vec3] {
        &self.vertex_normals
    }

    /// Whole mip level, or `None` past the pyramid.
    pub fn mip_level(&self, level: usize) -> Option<&[f32]> {
        match level {
            0 => Some(&self.center_heights),
            l if l < self.mip_levels => Some(&self.mips[l - 1]),
            _ => None,
        }
    }

    pub fn slope_map(&self) -> &[f32] {
        &self.slope
    }

    pub fn type_map(&self) -> &[u8] {
        &self.types
    }

    pub fn map_file_heights(&self) -> &[f32] {
        &self.map_file_heights
    }

    pub fn original_heights(&self) -> &[f32] {
        &self.original_heights
    }
}

/// Bounds-check `(x, z)` against a `width` x `height` grid and return its index.
fn check(grid: &'static str, x: usize, z: usize, width: usize, height: usize) -> TerrainResult<usize> {
    if x < width && z < height {
        Ok(z * width + x)
    } else {
        Err(TerrainError::OutOfBounds {
            grid,
            x: x as i64,
            z: z as i64,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(levels: usize) -> TerrainConfig {
        TerrainConfig { mip_levels: levels, ..Default::default() }
    }

    #[test]
    fn test_allocation_sizes() {
        let field = HeightField::new(8, 4, &config(3)).unwrap();
        assert_eq!(field.synced_corners().len(), 9 * 5);
        assert_eq!(field.center_heights().len(), 32);
        assert_eq!(field.mip_level(1).unwrap().len(), 4 * 2);
        assert_eq!(field.mip_level(2).unwrap().len(), 2);
        assert!(field.mip_level(3).is_none());
        assert_eq!(field.slope_map().len(), 4 * 2);
        assert_eq!(field.type_map().len(), 8);
    }

    #[test]
    fn test_rejects_unaligned_dimensions() {
        let err = HeightField::new(12, 8, &config(4)).unwrap_err();
        assert!(matches!(err, TerrainError::Configuration { width: 12, height: 8, .. }));
        assert!(HeightField::new(16, 8, &config(4)).is_ok());
        assert!(HeightField::new(0, 8, &config(1)).is_err());
        assert!(HeightField::new(5, 4, &config(1)).is_err());
        assert!(HeightField::new(4, 4, &config(0)).is_err());
    }

    #[test]
    fn test_aliased_unsynced_reads_synced() {
        let cfg = TerrainConfig { sync_mode: SyncMode::Aliased, mip_levels: 2, ..Default::default() };
        let mut field = HeightField::new(4, 4, &cfg).unwrap();
        field.write_synced_region(Rect::point(1, 1), &[3.0]).unwrap();
        assert_eq!(field.read_unsynced(1, 1).unwrap(), 3.0);
    }

    #[test]
    fn test_dual_unsynced_lags() {
        let mut field = HeightField::new(4, 4, &config(2)).unwrap();
        field.write_synced_region(Rect::point(1, 1), &[3.0]).unwrap();
        assert_eq!(field.read_synced(1, 1).unwrap(), 3.0);
        assert_eq!(field.read_unsynced(1, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_write_region_row_major() {
        let mut field = HeightField::new(4, 4, &config(1)).unwrap();
        field.write_synced_region(Rect::new(1, 2, 2, 3), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(field.read_synced(1, 2).unwrap(), 1.0);
        assert_eq!(field.read_synced(2, 2).unwrap(), 2.0);
        assert_eq!(field.read_synced(1, 3).unwrap(), 3.0);
        assert_eq!(field.read_synced(2, 3).unwrap(), 4.0);
    }

    #[test]
    fn test_write_region_errors() {
        let mut field = HeightField::new(4, 4, &config(1)).unwrap();
        assert!(matches!(
            field.write_synced_region(Rect::new(3, 3, 5, 4), &[0.0; 6]),
            Err(TerrainError::OutOfBounds { grid: "corner", x: 5, .. })
        ));
        assert!(matches!(
            field.write_synced_region(Rect::new(0, 0, 1, 1), &[0.0; 3]),
            Err(TerrainError::SizeMismatch { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_accessors_do_not_clamp() {
        let field = HeightField::new(4, 4, &config(2)).unwrap();
        assert!(field.read_synced(4, 4).is_ok());
        assert!(field.read_synced(5, 0).is_err());
        assert!(field.read_center_height(4, 0).is_err());
        assert!(field.read_mip(1, 2, 0).is_err());
        assert!(matches!(
            field.read_mip(2, 0, 0),
            Err(TerrainError::MipLevelOutOfBounds { level: 2, levels: 2 })
        ));
        assert!(field.read_slope(2, 0).is_err());
        assert!(field.read_type(0, 2).is_err());
    }

    #[test]
    fn test_flat_initial_state() {
        let field = HeightField::new(4, 4, &config(2)).unwrap();
        assert_eq!(field.read_slope(1, 1).unwrap(), 1.0);
        assert_eq!(field.read_center_normal(0, 0).unwrap(), Vec3::Y);
        assert_eq!(field.dims().bounding_radius(), (32.0f32 * 32.0 * 2.0).sqrt() * 0.5);
    }

    #[test]
    fn test_aliased_footprint_is_smaller() {
        let dual = HeightField::new(8, 8, &config(2)).unwrap();
        let aliased_cfg = TerrainConfig { sync_mode: SyncMode::Aliased, mip_levels: 2, ..Default::default() };
        let aliased = HeightField::new(8, 8, &aliased_cfg).unwrap();
        assert!(aliased.footprint_bytes() < dual.footprint_bytes());
    }
}
