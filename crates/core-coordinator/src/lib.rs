//! The coordinator role: rank 0 for every partitioning mode. Dispatches on
//! [`PartitioningMode`], drives whichever strategy's message exchange, merges
//! every rank's pixels into one full-image buffer, and returns it alongside
//! the run's [`TimingAccumulator`].
//!
//! Static strategies and dynamic scheduling share nothing procedurally — the
//! former is a fixed one-shot gather, the latter an open request/assign/result
//! loop — so each gets its own `run_*` function; [`run_coordinator`] is only
//! the dispatch point callers are expected to use.

use core_config::{ConfigData, PartitioningMode};
use core_geometry::{generate_tiles, interleaved_cycles, tiled_blocks, vertical_strips, Rect, WorkUnit};
use core_shading::{shade_rect, shade_rows, shade_tile, Shader};
use core_timing::TimingAccumulator;
use core_transport::{Message, Tag, Transport, TransportError};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("This mode ({mode}) is not currently implemented")]
    UnsupportedMode { mode: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("rank {rank} sent unexpected tag {tag:?}")]
    UnexpectedTag { rank: u32, tag: Tag },
    #[error("payload length mismatch: expected {expected}, got {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },
}

fn new_buffer(width: u32, height: u32) -> Vec<f32> {
    vec![0.0; width as usize * height as usize * 3]
}

fn merge_rect(buffer: &mut [f32], width: u32, rect: Rect, pixels: &[f32]) {
    assert_eq!(pixels.len(), rect.area() as usize * 3);
    let mut src = 0;
    for row in rect.first_row..=rect.last_row {
        for col in rect.first_col..=rect.last_col {
            let dst = Rect::offset_in(width, row, col);
            buffer[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
            src += 3;
        }
    }
}

fn merge_rows(buffer: &mut [f32], width: u32, rows: &[u32], pixels: &[f32]) {
    assert_eq!(pixels.len(), rows.len() * width as usize * 3);
    let mut src = 0;
    for &row in rows {
        for col in 0..width {
            let dst = Rect::offset_in(width, row, col);
            buffer[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
            src += 3;
        }
    }
}

fn merge_tile(buffer: &mut [f32], width: u32, tile: WorkUnit, pixels: &[f32]) {
    assert_eq!(pixels.len(), tile.area() as usize * 3);
    let mut src = 0;
    for i in 0..tile.tile_height {
        for j in 0..tile.tile_width {
            let dst = Rect::offset_in(width, tile.start_row + i, tile.start_col + j);
            buffer[dst..dst + 3].copy_from_slice(&pixels[src..src + 3]);
            src += 3;
        }
    }
}

/// Splits a worker payload into `(rgb_pixels, self_reported_compute_time)`.
/// Every payload's length is `3*area + 1`: RGB triples then the trailing
/// compute-time float.
fn split_trailing_time(mut payload: Vec<f32>) -> (Vec<f32>, f64) {
    let time = payload.pop().unwrap_or(0.0) as f64;
    (payload, time)
}

/// No partitioning: rank 0 shades the entire image itself. `proc_count == 1`
/// and no messages are ever exchanged, so communication time stays at zero
/// and [`TimingAccumulator::c_to_c_ratio`] is `NaN` rather than a synthesized
/// sentinel.
pub fn run_sequential(
    config: &ConfigData,
    shader: &impl Shader,
) -> (Vec<f32>, TimingAccumulator) {
    let mut timing = TimingAccumulator::new();
    let mut buffer = new_buffer(config.width, config.height);
    let rect = Rect {
        first_row: 0,
        last_row: config.height - 1,
        first_col: 0,
        last_col: config.width - 1,
    };
    let (pixels, compute_time) = shade_rect(shader, rect, config);
    timing.add_computation(compute_time);
    merge_rect(&mut buffer, config.width, rect, &pixels);
    (buffer, timing)
}

/// Receives every other rank's one-shot static result and merges it, via a
/// caller-supplied per-rank region lookup shared with the worker side — the
/// same pure geometry function both sides call, so they can never disagree
/// about who owns what.
fn gather_static<F>(
    transport: &mut Transport,
    config: &ConfigData,
    buffer: &mut [f32],
    timing: &mut TimingAccumulator,
    mut merge_one: F,
) -> Result<(), CoordinatorError>
where
    F: FnMut(&mut [f32], u32, &[f32]),
{
    for rank in 1..config.proc_count {
        let env = timing.time_communication(|| transport.recv(Some(rank), Some(Tag::StaticResult)))?;
        let Message::StaticResult(payload) = env.message else {
            return Err(CoordinatorError::UnexpectedTag {
                rank,
                tag: env.message.tag(),
            });
        };
        let (pixels, compute_time) = split_trailing_time(payload);
        timing.add_computation(compute_time);
        merge_one(buffer, rank, &pixels);
    }
    Ok(())
}

pub fn run_static_strips(
    transport: &mut Transport,
    config: &ConfigData,
    shader: &impl Shader,
) -> Result<(Vec<f32>, TimingAccumulator), CoordinatorError> {
    let mut timing = TimingAccumulator::new();
    let mut buffer = new_buffer(config.width, config.height);

    if let Some(rect) = vertical_strips(config.width, config.height, config.proc_count, 0) {
        let (pixels, compute_time) = shade_rect(shader, rect, config);
        timing.add_computation(compute_time);
        merge_rect(&mut buffer, config.width, rect, &pixels);
    }

    gather_static(transport, config, &mut buffer, &mut timing, |buf, rank, pixels| {
        if let Some(rect) = vertical_strips(config.width, config.height, config.proc_count, rank) {
            merge_rect(buf, config.width, rect, pixels);
        }
    })?;

    Ok((buffer, timing))
}

pub fn run_static_blocks(
    transport: &mut Transport,
    config: &ConfigData,
    shader: &impl Shader,
) -> Result<(Vec<f32>, TimingAccumulator), CoordinatorError> {
    let mut timing = TimingAccumulator::new();
    let mut buffer = new_buffer(config.width, config.height);

    if let Some(rect) = tiled_blocks(config.width, config.height, config.proc_count, 0) {
        let (pixels, compute_time) = shade_rect(shader, rect, config);
        timing.add_computation(compute_time);
        merge_rect(&mut buffer, config.width, rect, &pixels);
    }

    gather_static(transport, config, &mut buffer, &mut timing, |buf, rank, pixels| {
        if let Some(rect) = tiled_blocks(config.width, config.height, config.proc_count, rank) {
            merge_rect(buf, config.width, rect, pixels);
        }
    })?;

    Ok((buffer, timing))
}

pub fn run_static_cycles(
    transport: &mut Transport,
    config: &ConfigData,
    shader: &impl Shader,
) -> Result<(Vec<f32>, TimingAccumulator), CoordinatorError> {
    let mut timing = TimingAccumulator::new();
    let mut buffer = new_buffer(config.width, config.height);

    let own_rows = interleaved_cycles(config.height, config.proc_count, 0, config.cycle_size);
    if !own_rows.is_empty() {
        let (pixels, compute_time) = shade_rows(shader, &own_rows, config.width, config);
        timing.add_computation(compute_time);
        merge_rows(&mut buffer, config.width, &own_rows, &pixels);
    }

    gather_static(transport, config, &mut buffer, &mut timing, |buf, rank, pixels| {
        let rows = interleaved_cycles(config.height, config.proc_count, rank, config.cycle_size);
        if !rows.is_empty() {
            merge_rows(buf, config.width, &rows, pixels);
        }
    })?;

    Ok((buffer, timing))
}

/// Centralized work-stealing: a FIFO tile queue, an in-flight table keyed by
/// the rank currently shading each tile, and sentinel `(0,0,0,0)`
/// assignments to retire workers once the queue runs dry.
pub fn run_dynamic(
    transport: &mut Transport,
    config: &ConfigData,
) -> Result<(Vec<f32>, TimingAccumulator), CoordinatorError> {
    let mut timing = TimingAccumulator::new();
    let mut buffer = new_buffer(config.width, config.height);
    let mut queue: VecDeque<WorkUnit> =
        generate_tiles(config.width, config.height, config.dynamic_block_width, config.dynamic_block_height);
    let mut in_flight: HashMap<u32, WorkUnit> = HashMap::new();
    let worker_count = config.proc_count.saturating_sub(1);
    let mut retired = 0u32;

    while retired < worker_count || !in_flight.is_empty() {
        let env = timing.time_communication(|| transport.recv(None, None))?;
        match env.message {
            Message::Request => {
                let assign = match queue.pop_front() {
                    Some(tile) => {
                        in_flight.insert(env.from, tile);
                        Message::Assign {
                            start_row: tile.start_row as i32,
                            start_col: tile.start_col as i32,
                            tile_width: tile.tile_width as i32,
                            tile_height: tile.tile_height as i32,
                        }
                    }
                    None => {
                        retired += 1;
                        Message::sentinel_assign()
                    }
                };
                timing.time_communication(|| transport.send(env.from, assign))?;
            }
            Message::Result(payload) => {
                let tile = in_flight.remove(&env.from).ok_or(CoordinatorError::UnexpectedTag {
                    rank: env.from,
                    tag: Tag::Result,
                })?;
                let (pixels, compute_time) = split_trailing_time(payload);
                timing.add_computation(compute_time);
                merge_tile(&mut buffer, config.width, tile, &pixels);
            }
            other => {
                return Err(CoordinatorError::UnexpectedTag {
                    rank: env.from,
                    tag: other.tag(),
                });
            }
        }
    }

    Ok((buffer, timing))
}

/// Dispatches to the strategy named by `config.partitioning_mode`.
/// `transport` is unused for sequential mode (`proc_count == 1`, nothing to
/// exchange) but still threaded through so every mode shares one call shape.
pub fn run_coordinator(
    transport: &mut Transport,
    config: &ConfigData,
    shader: &impl Shader,
) -> Result<(Vec<f32>, TimingAccumulator), CoordinatorError> {
    match &config.partitioning_mode {
        PartitioningMode::None => Ok(run_sequential(config, shader)),
        PartitioningMode::StaticStripsVertical => run_static_strips(transport, config, shader),
        PartitioningMode::StaticBlocks => run_static_blocks(transport, config, shader),
        PartitioningMode::StaticCyclesHorizontal => run_static_cycles(transport, config, shader),
        PartitioningMode::Dynamic => run_dynamic(transport, config),
        PartitioningMode::Unsupported(raw) => Err(CoordinatorError::UnsupportedMode { mode: raw.clone() }),
    }
}
