//! Derivation pipeline: rebuilds every grid that depends on the synced
//! corner heights, for exactly the region a mutation touched.
//!
//! ## Stage Order
//!
//! 1. Center heights (mean of the four corners of each square)
//! 2. Mip pyramid, level 1 upwards (2x2 box filter of the level below)
//! 3. Face normals, then center normals (sum of the two face normals)
//! 4. Slope map (reads face normals, so it must run after stage 3)
//!
//! ## Parallel Feature
//!
//! When compiled with `--features parallel`, each stage is split into one
//! rayon task per output row. A task writes only its own row and reads only
//! inputs that no stage task writes, and no stage reduces across rows, so
//! the output is bit-identical for any thread count.

use crate::heightfield::{HeightField, MapDims, UnsyncedStore};
use crate::rect::Rect;
use glam::{Vec2, Vec3};
use tracing::{debug_span, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Recompute every synced derived buffer affected by corner changes in `rect`.
///
/// `rect` is in corner coordinates and may extend past the map; it is
/// clamped here. An inverted rectangle is ignored. On the initial load the
/// unsynced normal buffers are seeded with the synced results so the first
/// frame has consistent shading.
pub fn apply(field: &mut HeightField, rect: Rect, is_initial_load: bool) {
    if rect.is_empty() {
        return;
    }
    let dims = field.dims;
    let _span = debug_span!("terrain.apply", x1 = rect.x1, z1 = rect.z1, x2 = rect.x2, z2 = rect.z2).entered();

    let center_rect = rect.expand(1).clamp_to(dims.mapx as i32 - 1, dims.mapy as i32 - 1);
    let normal_rect = center_rect.expand(1).clamp_to(dims.mapx as i32 - 1, dims.mapy as i32 - 1);

    update_center_heights(field, center_rect);
    update_mips(field, center_rect);

    compute_face_normals(&field.synced.corners, &mut field.synced.face_normals, &dims, normal_rect);
    compute_center_normals(&field.synced.face_normals, &mut field.synced.center_normals, &dims, normal_rect);
    update_center_normals_2d(field, normal_rect);

    if is_initial_load {
        if let UnsyncedStore::Dual(unsynced) = &mut field.unsynced {
            let face_rect = Rect::new(normal_rect.x1 * 2, normal_rect.z1, normal_rect.x2 * 2 + 1, normal_rect.z2);
            copy_rows(&field.synced.face_normals, &mut unsynced.face_normals, dims.mapx * 2, face_rect);
            copy_rows(&field.synced.center_normals, &mut unsynced.center_normals, dims.mapx, normal_rect);
        }
        update_vertex_normals(field, rect.expand(1).clamp_to(dims.mapx as i32, dims.mapy as i32));
    }

    update_slope(field, center_rect);

    trace!(?center_rect, is_initial_load, "derived synced terrain buffers");
}

/// Bring the unsynced view of `rect` (corner coordinates) up to date with
/// the synced grid.
///
/// Unsynced normals are recomputed from the unsynced corners so shading
/// never reflects synced data that has not been propagated yet.
pub fn refresh_unsynced(field: &mut HeightField, rect: Rect) {
    if rect.is_empty() {
        return;
    }
    let dims = field.dims;
    let corner_rect = rect.clamp_to(dims.mapx as i32, dims.mapy as i32);
    // squares sharing at least one corner with the rectangle
    let square_rect = Rect::new(corner_rect.x1 - 1, corner_rect.z1 - 1, corner_rect.x2, corner_rect.z2)
        .clamp_to(dims.mapx as i32 - 1, dims.mapy as i32 - 1);

    if let UnsyncedStore::Dual(unsynced) = &mut field.unsynced {
        copy_rows(&field.synced.corners, &mut unsynced.corners, dims.mapxp1(), corner_rect);
        compute_face_normals(&unsynced.corners, &mut unsynced.face_normals, &dims, square_rect);
        compute_center_normals(&unsynced.face_normals, &mut unsynced.center_normals, &dims, square_rect);
    }

    update_vertex_normals(field, corner_rect.expand(1).clamp_to(dims.mapx as i32, dims.mapy as i32));
}

/// Run `f(z, row)` over rows `z1..=z2` of a row-major buffer.
fn for_each_row<T, F>(buf: &mut [T], row_len: usize, rows: (usize, usize), f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    let (z1, z2) = rows;
    let rows = &mut buf[z1 * row_len..(z2 + 1) * row_len];

    #[cfg(feature = "parallel")]
    rows.par_chunks_mut(row_len).enumerate().for_each(|(i, row)| f(z1 + i, row));

    #[cfg(not(feature = "parallel"))]
    rows.chunks_mut(row_len).enumerate().for_each(|(i, row)| f(z1 + i, row));
}

fn copy_rows<T: Copy>(src: &[T], dst: &mut [T], row_len: usize, rect: Rect) {
    let (x1, x2) = (rect.x1 as usize, rect.x2 as usize);
    for z in rect.z1 as usize..=rect.z2 as usize {
        let row = z * row_len;
        dst[row + x1..=row + x2].copy_from_slice(&src[row + x1..=row + x2]);
    }
}

fn update_center_heights(field: &mut HeightField, rect: Rect) {
    let dims = field.dims;
    let stride = dims.mapxp1();
    let corners = &field.synced.corners;
    let (x1, x2) = (rect.x1 as usize, rect.x2 as usize);

    for_each_row(&mut field.center_heights, dims.mapx, (rect.z1 as usize, rect.z2 as usize), |z, row| {
        for (x, out) in row.iter_mut().enumerate().take(x2 + 1).skip(x1) {
            let tl = z * stride + x;
            let bl = tl + stride;
            *out = (corners[tl] + corners[tl + 1] + corners[bl] + corners[bl + 1]) * 0.25;
        }
    });
}

/// Recompute every 2x2 block that overlaps `rect` (center coordinates) at
/// each level, so unaligned and edge rectangles keep the pyramid exact.
fn update_mips(field: &mut HeightField, rect: Rect) {
    let dims = field.dims;

    for level in 0..field.mip_levels - 1 {
        let src_w = dims.mapx >> level;
        let dst_w = dims.mapx >> (level + 1);
        let dst_h = dims.mapy >> (level + 1);

        let shift = level + 1;
        let bx1 = rect.x1 as usize >> shift;
        let bx2 = (rect.x2 as usize >> shift).min(dst_w - 1);
        let bz1 = rect.z1 as usize >> shift;
        let bz2 = (rect.z2 as usize >> shift).min(dst_h - 1);

        let (src, dst): (&[f32], &mut [f32]) = if level == 0 {
            (&field.center_heights, &mut field.mips[0])
        } else {
            let (lower, upper) = field.mips.split_at_mut(level);
            (&lower[level - 1], &mut upper[0])
        };

        for_each_row(dst, dst_w, (bz1, bz2), |z, row| {
            let top = (z * 2) * src_w;
            let bottom = top + src_w;
            for (x, out) in row.iter_mut().enumerate().take(bx2 + 1).skip(bx1) {
                let sx = x * 2;
                *out = (src[top + sx] + src[bottom + sx] + src[top + sx + 1] + src[bottom + sx + 1]) * 0.25;
            }
        });
    }
}

/// Two triangle normals per square, split along the TR-BL diagonal.
///
/// ```text
/// TL ---- TR
///  | \ TL  |
///  |  \    |
///  | BR \  |
/// BL ---- BR
/// ```
pub(crate) fn compute_face_normals(corners: &[f32], faces: &mut [Vec3], dims: &MapDims, rect: Rect) {
    let stride = dims.mapxp1();
    let up = dims.square_size;
    let (x1, x2) = (rect.x1 as usize, rect.x2 as usize);

    for_each_row(faces, dims.mapx * 2, (rect.z1 as usize, rect.z2 as usize), |z, row| {
        for x in x1..=x2 {
            let tl = z * stride + x;
            let bl = tl + stride;
            let (h_tl, h_tr, h_bl, h_br) = (corners[tl], corners[tl + 1], corners[bl], corners[bl + 1]);

            row[x * 2] = Vec3::new(-(h_tr - h_tl), up, -(h_bl - h_tl)).normalize();
            row[x * 2 + 1] = Vec3::new(h_bl - h_br, up, h_tr - h_br).normalize();
        }
    });
}

pub(crate) fn compute_center_normals(faces: &[Vec3], centers: &mut [Vec3], dims: &MapDims, rect: Rect) {
    let (x1, x2) = (rect.x1 as usize, rect.x2 as usize);
    let mapx = dims.mapx;

    for_each_row(centers, mapx, (rect.z1 as usize, rect.z2 as usize), |z, row| {
        for (x, out) in row.iter_mut().enumerate().take(x2 + 1).skip(x1) {
            let i = (z * mapx + x) * 2;
            *out = (faces[i] + faces[i + 1]).normalize();
        }
    });
}

fn update_center_normals_2d(field: &mut HeightField, rect: Rect) {
    let mapx = field.dims.mapx;
    let faces = &field.synced.face_normals;
    let (x1, x2) = (rect.x1 as usize, rect.x2 as usize);

    for_each_row(&mut field.center_normals_2d, mapx, (rect.z1 as usize, rect.z2 as usize), |z, row| {
        for (x, out) in row.iter_mut().enumerate().take(x2 + 1).skip(x1) {
            let i = (z * mapx + x) * 2;
            let sum = faces[i] + faces[i + 1];
            *out = Vec2::new(sum.x, sum.z).normalize_or_zero();
        }
    });
}

/// Blend of the six triangle normals touching each corner in `rect`.
fn update_vertex_normals(field: &mut HeightField, rect: Rect) {
    let dims = field.dims;
    let faces: &[Vec3] = match &field.unsynced {
        UnsyncedStore::Aliased => &field.synced.face_normals,
        UnsyncedStore::Dual(unsynced) => &unsynced.face_normals,
    };
    let (x1, x2) = (rect.x1 as usize, rect.x2 as usize);

    for_each_row(&mut field.vertex_normals, dims.mapxp1(), (rect.z1 as usize, rect.z2 as usize), |z, row| {
        for (x, out) in row.iter_mut().enumerate().take(x2 + 1).skip(x1) {
            let mut sum = Vec3::ZERO;
            let face = |sx: usize, sz: usize| (sz * dims.mapx + sx) * 2;

            if x > 0 && z > 0 {
                sum += faces[face(x - 1, z - 1) + 1];
            }
            if x < dims.mapx && z > 0 {
                let i = face(x, z - 1);
                sum += faces[i] + faces[i + 1];
            }
            if x > 0 && z < dims.mapy {
                let i = face(x - 1, z);
                sum += faces[i] + faces[i + 1];
            }
            if x < dims.mapx && z < dims.mapy {
                sum += faces[face(x, z)];
            }
            *out = sum.normalize_or_zero();
        }
    });
}

fn update_slope(field: &mut HeightField, center_rect: Rect) {
    let dims = field.dims;
    let (hx, hy) = (dims.hmapx() as i32, dims.hmapy() as i32);
    let x1 = (center_rect.x1 / 2 - 1).max(0) as usize;
    let x2 = (center_rect.x2 / 2 + 1).min(hx - 1) as usize;
    let z1 = (center_rect.z1 / 2 - 1).max(0) as usize;
    let z2 = (center_rect.z2 / 2 + 1).min(hy - 1) as usize;

    let faces = &field.synced.face_normals;
    let mapx = dims.mapx;

    for_each_row(&mut field.slope, dims.hmapx(), (z1, z2), |z, row| {
        for (x, out) in row.iter_mut().enumerate().take(x2 + 1).skip(x1) {
            let top = (z * 2) * mapx + x * 2;
            let bottom = top + mapx;
            let up = [
                faces[top * 2].y,
                faces[top * 2 + 1].y,
                faces[(top + 1) * 2].y,
                faces[(top + 1) * 2 + 1].y,
                faces[bottom * 2].y,
                faces[bottom * 2 + 1].y,
                faces[(bottom + 1) * 2].y,
                faces[(bottom + 1) * 2 + 1].y,
            ];
            *out = blend_slope(&up);
        }
    });
}

/// Flatness of a slope cell from the up-components of its eight triangles.
///
/// The steepest triangle is blended towards the cell average by the ratio
/// `steepest / average`, so a single sharp dent does not make the whole cell
/// impassable. Both inputs lie in `(0, 1]` for any finite heights, so the
/// ratio lies in `(0, 1]`; a degenerate average collapses to a cliff.
pub(crate) fn blend_slope(up: &[f32; 8]) -> f32 {
    let avg = up.iter().fold(0.0f32, |acc, y| acc + y) * 0.125;
    let min = up.iter().copied().fold(up[0], f32::min);

    if !(avg > f32::MIN_POSITIVE) {
        return 0.0;
    }

    let ratio = min / avg;
    (min + (avg - min) * ratio).clamp(0.0, 1.0)
}
