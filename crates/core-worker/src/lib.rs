//! The worker role: every rank other than 0. Static workers compute their
//! own region with the same pure geometry functions the coordinator uses and
//! send exactly one result, unprompted; dynamic workers loop on
//! request/assign/result until the coordinator hands back the sentinel
//! assignment.

use core_config::{ConfigData, PartitioningMode};
use core_geometry::{interleaved_cycles, tiled_blocks, vertical_strips, WorkUnit};
use core_shading::{shade_rect, shade_rows, shade_tile, with_trailing_compute_time, Shader};
use core_transport::{Message, Tag, Transport, TransportError};

/// Shades this rank's statically-assigned region and sends one
/// `STATIC_RESULT`. A rank whose region is empty (possible
/// under `STATIC_BLOCKS` when `proc_count` is not a perfect square) still
/// sends a payload — length 1, just its (near-zero) compute time — so the
/// coordinator's fixed per-rank receive loop never blocks waiting on a rank
/// with nothing to report.
pub fn run_static_worker(
    transport: &Transport,
    config: &ConfigData,
    shader: &impl Shader,
) -> Result<(), TransportError> {
    let rank = transport.rank();
    let payload = match &config.partitioning_mode {
        PartitioningMode::StaticStripsVertical => {
            match vertical_strips(config.width, config.height, config.proc_count, rank) {
                Some(rect) => {
                    let (pixels, t) = shade_rect(shader, rect, config);
                    with_trailing_compute_time(pixels, t)
                }
                None => vec![0.0],
            }
        }
        PartitioningMode::StaticBlocks => {
            match tiled_blocks(config.width, config.height, config.proc_count, rank) {
                Some(rect) => {
                    let (pixels, t) = shade_rect(shader, rect, config);
                    with_trailing_compute_time(pixels, t)
                }
                None => vec![0.0],
            }
        }
        PartitioningMode::StaticCyclesHorizontal => {
            let rows = interleaved_cycles(config.height, config.proc_count, rank, config.cycle_size);
            if rows.is_empty() {
                vec![0.0]
            } else {
                let (pixels, t) = shade_rows(shader, &rows, config.width, config);
                with_trailing_compute_time(pixels, t)
            }
        }
        other => {
            tracing::warn!(target: "worker", rank, mode = %other, "static worker invoked for a non-static mode");
            vec![0.0]
        }
    };

    tracing::debug!(target: "worker", rank, payload_len = payload.len(), "sending static result");
    transport.send(0, Message::StaticResult(payload))
}

/// The dynamic work-stealing worker loop: request, block for
/// an assignment, shade it, report back, repeat — until the coordinator's
/// assignment is the `(0,0,0,0)` sentinel.
pub fn run_dynamic_worker(
    transport: &mut Transport,
    config: &ConfigData,
    shader: &impl Shader,
) -> Result<(), TransportError> {
    let rank = transport.rank();
    loop {
        transport.send(0, Message::Request)?;
        let env = transport.recv(Some(0), Some(Tag::Assign))?;
        let Message::Assign {
            start_row,
            start_col,
            tile_width,
            tile_height,
        } = env.message
        else {
            unreachable!("filtered recv guarantees an Assign message");
        };
        let tile = WorkUnit {
            start_row: start_row as u32,
            start_col: start_col as u32,
            tile_width: tile_width as u32,
            tile_height: tile_height as u32,
        };
        if tile.tile_width == 0 && tile.tile_height == 0 {
            tracing::debug!(target: "worker", rank, "received sentinel, retiring");
            return Ok(());
        }
        let (pixels, t) = shade_tile(shader, tile, config);
        let payload = with_trailing_compute_time(pixels, t);
        transport.send(0, Message::Result(payload))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_shading::reference_shader;
    use core_transport::Fabric;

    fn cfg(width: u32, height: u32, mode: PartitioningMode, proc_count: u32, rank: u32) -> ConfigData {
        ConfigData {
            scene_id: "demo".to_string(),
            width,
            height,
            partitioning_mode: mode,
            dynamic_block_width: 4,
            dynamic_block_height: 4,
            cycle_size: 2,
            rank,
            proc_count,
            extra: Default::default(),
        }
    }

    #[test]
    fn static_worker_sends_exactly_one_payload_matching_its_region() {
        let mut ranks = Fabric::build(2);
        let worker = ranks.pop().unwrap();
        let mut coordinator = ranks.pop().unwrap();
        let config = cfg(10, 2, PartitioningMode::StaticStripsVertical, 2, 1);

        run_static_worker(&worker, &config, &reference_shader).unwrap();

        let env = coordinator.recv(Some(1), Some(Tag::StaticResult)).unwrap();
        let Message::StaticResult(payload) = env.message else {
            panic!("expected static result");
        };
        let rect = vertical_strips(10, 2, 2, 1).unwrap();
        assert_eq!(payload.len(), rect.area() as usize * 3 + 1);
    }

    #[test]
    fn static_worker_with_empty_region_still_sends_one_payload() {
        // width=4, height=20, proc_count=4 -> grid=2, dim=4: the grid is
        // twice as wide as the image, so every rank in the second grid
        // column has no tile under STATIC_BLOCKS.
        let width = 4;
        let height = 20;
        let proc_count = 4;
        let empty_rank = (0..proc_count)
            .find(|&r| tiled_blocks(width, height, proc_count, r).is_none())
            .expect("this configuration has at least one empty rank");

        let mut ranks = Fabric::build(proc_count);
        let worker = ranks.remove(empty_rank as usize);
        let mut coordinator = ranks.remove(0);
        let config = cfg(width, height, PartitioningMode::StaticBlocks, proc_count, empty_rank);

        run_static_worker(&worker, &config, &reference_shader).unwrap();

        let env = coordinator.recv(Some(empty_rank), Some(Tag::StaticResult)).unwrap();
        let Message::StaticResult(payload) = env.message else {
            panic!("expected static result");
        };
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn dynamic_worker_retires_on_sentinel_without_sending_a_result() {
        let mut ranks = Fabric::build(2);
        let mut worker = ranks.pop().unwrap();
        let coordinator = ranks.pop().unwrap();
        let config = cfg(8, 8, PartitioningMode::Dynamic, 2, 1);

        let handle = std::thread::spawn(move || run_dynamic_worker(&mut worker, &config, &reference_shader));

        let env = coordinator.recv(Some(1), Some(Tag::Request)).unwrap();
        assert!(matches!(env.message, Message::Request));
        coordinator.send(1, Message::sentinel_assign()).unwrap();

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn dynamic_worker_shades_assigned_tile_and_reports_result() {
        let mut ranks = Fabric::build(2);
        let mut worker = ranks.pop().unwrap();
        let coordinator = ranks.pop().unwrap();
        let config = cfg(8, 8, PartitioningMode::Dynamic, 2, 1);

        let handle = std::thread::spawn(move || run_dynamic_worker(&mut worker, &config, &reference_shader));

        let req = coordinator.recv(Some(1), Some(Tag::Request)).unwrap();
        assert!(matches!(req.message, Message::Request));
        coordinator
            .send(
                1,
                Message::Assign {
                    start_row: 0,
                    start_col: 0,
                    tile_width: 4,
                    tile_height: 4,
                },
            )
            .unwrap();

        let result = coordinator.recv(Some(1), Some(Tag::Result)).unwrap();
        let Message::Result(payload) = result.message else {
            panic!("expected result");
        };
        assert_eq!(payload.len(), 4 * 4 * 3 + 1);

        coordinator
            .recv(Some(1), Some(Tag::Request))
            .unwrap();
        coordinator.send(1, Message::sentinel_assign()).unwrap();
        handle.join().unwrap().unwrap();
    }
}
