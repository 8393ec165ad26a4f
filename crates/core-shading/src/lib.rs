//! The shader driver: packs pixels contiguously, row-major, for whatever
//! geometric description a rank owns, and measures the wall-clock it took.
//!
//! The pixel shader itself — `(row, col, ConfigData) -> RGB` — is an
//! external collaborator: assumed pure, deterministic, thread-safe.
//! [`reference_shader`] is a small concrete stand-in (an analytic gradient,
//! not a ray tracer) so the coordination layer has something real to
//! distribute and so output-determinism is checkable end-to-end.

use core_config::ConfigData;
use core_geometry::{Rect, WorkUnit};
use std::time::Instant;

/// Any `(row, col, config) -> [r, g, b]` function the driver can invoke.
/// Callers are trusted to supply something pure and side-effect free.
pub trait Shader: Fn(u32, u32, &ConfigData) -> [f32; 3] + Send + Sync {}
impl<T> Shader for T where T: Fn(u32, u32, &ConfigData) -> [f32; 3] + Send + Sync {}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

/// A deterministic analytic gradient, seeded by `scene_id`. Pure, no I/O,
/// safe to call concurrently from any rank.
pub fn reference_shader(row: u32, col: u32, config: &ConfigData) -> [f32; 3] {
    let width = config.width.max(1) as f32;
    let height = config.height.max(1) as f32;
    let u = col as f32 / width;
    let v = row as f32 / height;
    let seed = (fnv1a(config.scene_id.as_bytes()) % 1_000) as f32 / 1_000.0;
    [
        (u + seed).fract(),
        (v + seed * 0.5).fract(),
        ((u + v) * 0.5 + seed * 0.25).fract(),
    ]
}

/// Shades every pixel in `rect`, packed row-major local to the rect (not the
/// global image). Returns `(pixels, compute_time_seconds)`.
pub fn shade_rect(shader: &impl Shader, rect: Rect, config: &ConfigData) -> (Vec<f32>, f64) {
    let start = Instant::now();
    let mut out = Vec::with_capacity(rect.area() as usize * 3);
    for row in rect.first_row..=rect.last_row {
        for col in rect.first_col..=rect.last_col {
            let rgb = shader(row, col, config);
            out.extend_from_slice(&rgb);
        }
    }
    (out, start.elapsed().as_secs_f64())
}

/// Shades every column of every row in `rows`, full image width, packed
/// row-major in the order `rows` is given. Returns `(pixels, compute_time)`.
pub fn shade_rows(shader: &impl Shader, rows: &[u32], width: u32, config: &ConfigData) -> (Vec<f32>, f64) {
    let start = Instant::now();
    let mut out = Vec::with_capacity(rows.len() * width as usize * 3);
    for &row in rows {
        for col in 0..width {
            let rgb = shader(row, col, config);
            out.extend_from_slice(&rgb);
        }
    }
    (out, start.elapsed().as_secs_f64())
}

/// Shades a dynamic-mode tile, row-major within the tile. Returns
/// `(pixels, compute_time)`.
pub fn shade_tile(shader: &impl Shader, tile: WorkUnit, config: &ConfigData) -> (Vec<f32>, f64) {
    let start = Instant::now();
    let mut out = Vec::with_capacity(tile.area() as usize * 3);
    for i in 0..tile.tile_height {
        for j in 0..tile.tile_width {
            let rgb = shader(tile.start_row + i, tile.start_col + j, config);
            out.extend_from_slice(&rgb);
        }
    }
    (out, start.elapsed().as_secs_f64())
}

/// Appends the worker's self-measured compute time as the trailing float of
/// a wire payload: every worker payload ends with the worker's own
/// wall-clock measurement of the time it spent shading.
pub fn with_trailing_compute_time(mut pixels: Vec<f32>, compute_time: f64) -> Vec<f32> {
    pixels.push(compute_time as f32);
    pixels
}
