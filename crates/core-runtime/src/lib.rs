//! Wires one job's config to a running fabric of ranks, and the finished
//! image to disk. This is the one layer that knows about threads, file
//! paths, and logging setup all at once — every other core here stays pure
//! or message-shaped.

use core_config::{ConfigData, PartitioningMode};
use core_coordinator::{run_coordinator, CoordinatorError};
use core_geometry::{interleaved_cycles, tiled_blocks};
use core_imagewriter::{write_ppm, ImageWriteError};
use core_shading::Shader;
use core_timing::TimingAccumulator;
use core_transport::{Fabric, TransportError};
use core_worker::{run_dynamic_worker, run_static_worker};
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("rank {rank} worker thread failed: {source}")]
    Worker { rank: u32, source: TransportError },
    #[error("rank {rank} worker thread panicked")]
    WorkerPanicked { rank: u32 },
    #[error(transparent)]
    ImageWrite(#[from] ImageWriteError),
    #[error("could not create renders directory {path}: {source}")]
    RendersDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Ensures `base` exists as a directory, creating it (and parents) if not.
pub fn ensure_renders_dir(base: impl AsRef<Path>) -> Result<PathBuf, RuntimeError> {
    let base = base.as_ref();
    std::fs::create_dir_all(base).map_err(|source| RuntimeError::RendersDir {
        path: base.display().to_string(),
        source,
    })?;
    Ok(base.to_path_buf())
}

/// Logs the per-rank region a static worker is about to shade, before it
/// shades it — this core's one piece of supplementary diagnostic logging
/// beyond the mandated three-line timing report.
fn log_static_worker_geometry(config: &ConfigData, rank: u32) {
    match &config.partitioning_mode {
        PartitioningMode::StaticBlocks => {
            match tiled_blocks(config.width, config.height, config.proc_count, rank) {
                Some(rect) => tracing::info!(
                    target: "runtime",
                    rank,
                    first_row = rect.first_row,
                    last_row = rect.last_row,
                    first_col = rect.first_col,
                    last_col = rect.last_col,
                    "rank_region"
                ),
                None => tracing::info!(target: "runtime", rank, "rank_region_empty"),
            }
        }
        PartitioningMode::StaticCyclesHorizontal => {
            let rows = interleaved_cycles(config.height, config.proc_count, rank, config.cycle_size);
            tracing::info!(target: "runtime", rank, row_count = rows.len(), "rank_rows");
        }
        _ => {}
    }
}

/// Runs one rendering job end to end: spawns one thread per rank (rank 0
/// runs the coordinator inline on the calling thread), waits for every
/// worker, prints the timing report, and writes the gathered image under
/// `renders_dir/{scene_id}.ppm`.
pub fn run_job<S>(config: &ConfigData, renders_dir: impl AsRef<Path>, shader: S) -> Result<PathBuf, RuntimeError>
where
    S: Shader + Copy + Send + Sync + 'static,
{
    tracing::info!(
        target: "runtime",
        scene_id = %config.scene_id,
        width = config.width,
        height = config.height,
        mode = %config.partitioning_mode,
        proc_count = config.proc_count,
        dynamic_block_width = config.dynamic_block_width,
        dynamic_block_height = config.dynamic_block_height,
        cycle_size = config.cycle_size,
        "job_starting"
    );

    if let PartitioningMode::Unsupported(raw) = &config.partitioning_mode {
        return Err(CoordinatorError::UnsupportedMode { mode: raw.clone() }.into());
    }

    let renders_dir = ensure_renders_dir(renders_dir)?;
    let mut ranks = Fabric::build(config.proc_count);
    let coordinator_transport = ranks.remove(0);

    let worker_handles: Vec<_> = ranks
        .into_iter()
        .map(|mut transport| {
            let rank = transport.rank();
            let worker_config = config.for_rank(rank, config.proc_count);
            thread::spawn(move || -> Result<(), TransportError> {
                match &worker_config.partitioning_mode {
                    PartitioningMode::Dynamic => run_dynamic_worker(&mut transport, &worker_config, &shader)?,
                    PartitioningMode::None => {}
                    _ => {
                        log_static_worker_geometry(&worker_config, rank);
                        run_static_worker(&transport, &worker_config, &shader)?;
                    }
                }
                transport.barrier();
                Ok(())
            })
        })
        .collect();

    let mut transport = coordinator_transport;
    let (pixels, timing) = run_coordinator(&mut transport, config, &shader)?;
    transport.barrier();

    for (rank, handle) in (1u32..).zip(worker_handles) {
        handle
            .join()
            .map_err(|_| RuntimeError::WorkerPanicked { rank })?
            .map_err(|source| RuntimeError::Worker { rank, source })?;
    }

    timing.emit_report();

    let output_path = renders_dir.join(format!("{}.ppm", config.scene_id));
    write_ppm(&output_path, config.width, config.height, &pixels)?;
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::PartitioningMode;
    use core_shading::reference_shader;

    fn cfg(mode: PartitioningMode, proc_count: u32) -> ConfigData {
        ConfigData {
            scene_id: "demo".to_string(),
            width: 8,
            height: 8,
            partitioning_mode: mode,
            dynamic_block_width: 4,
            dynamic_block_height: 4,
            cycle_size: 2,
            rank: 0,
            proc_count,
            extra: Default::default(),
        }
    }

    #[test]
    fn ensure_renders_dir_creates_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let created = ensure_renders_dir(&nested).unwrap();
        assert!(created.is_dir());
    }

    #[test]
    fn sequential_job_writes_an_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = cfg(PartitioningMode::None, 1);
        let path = run_job(&config, dir.path(), reference_shader).unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "demo.ppm");
    }

    #[test]
    fn static_strips_job_with_multiple_ranks_writes_an_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = cfg(PartitioningMode::StaticStripsVertical, 3);
        let path = run_job(&config, dir.path(), reference_shader).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn dynamic_job_with_multiple_ranks_writes_an_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = cfg(PartitioningMode::Dynamic, 3);
        let path = run_job(&config, dir.path(), reference_shader).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unsupported_mode_fails_before_writing_any_image() {
        let dir = tempfile::tempdir().unwrap();
        let config = cfg(PartitioningMode::Unsupported("bogus".to_string()), 1);
        let err = run_job(&config, dir.path(), reference_shader).unwrap_err();
        assert!(matches!(err, RuntimeError::Coordinator(_)));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
