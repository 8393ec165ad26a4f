//! Pure partition geometry: given `(width, height, proc_count, rank, params)`,
//! compute the pixel rectangle or row set a rank owns.
//!
//! Every function here is a pure function of its arguments — no I/O, no
//! shared state — so the coordinator and the worker can each call the same
//! code and never disagree about who owns what.

use std::collections::VecDeque;

/// An inclusive pixel rectangle, `[first_col..=last_col] x [first_row..=last_row]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u32,
    pub last_col: u32,
}

impl Rect {
    pub fn width(&self) -> u32 {
        self.last_col - self.first_col + 1
    }

    pub fn height(&self) -> u32 {
        self.last_row - self.first_row + 1
    }

    pub fn area(&self) -> u32 {
        self.width() * self.height()
    }

    /// Row-major byte/float offset of pixel `(row, col)` within a buffer
    /// allocated for the full image: `offset(r,c) = 3*(r*width+c)`.
    pub fn offset_in(width: u32, row: u32, col: u32) -> usize {
        3 * (row as usize * width as usize + col as usize)
    }
}

/// A rectangular tile assigned as a single unit under the dynamic strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub start_row: u32,
    pub start_col: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl WorkUnit {
    pub fn area(&self) -> u32 {
        self.tile_width * self.tile_height
    }
}

/// Vertical strips: rank `r` owns columns
/// `[r*cols, r*cols + cols - 1]`, full height; the last rank also owns the
/// `width mod proc_count` trailing columns. `None` for degenerate inputs
/// (e.g. `proc_count > width`) rather than panicking.
pub fn vertical_strips(width: u32, height: u32, proc_count: u32, rank: u32) -> Option<Rect> {
    if proc_count == 0 || width == 0 || height == 0 {
        return None;
    }
    let cols = (width / proc_count) as i64;
    let extra = (width % proc_count) as i64;
    let first_col = rank as i64 * cols;
    let mut last_col = first_col + cols - 1;
    if rank == proc_count - 1 {
        last_col += extra;
    }
    if last_col < first_col || first_col >= width as i64 {
        return None;
    }
    Some(Rect {
        first_row: 0,
        last_row: height - 1,
        first_col: first_col as u32,
        last_col: last_col as u32,
    })
}

struct BlockGrid {
    grid: u32,
    dim: u32,
    h_offset: u32,
    v_offset: u32,
}

fn block_grid(width: u32, height: u32, proc_count: u32) -> BlockGrid {
    let root = (proc_count as f64).sqrt().floor() as u32;
    let grid = if root * root == proc_count { root } else { root + 1 };
    let grid = grid.max(1);
    let dim = (((width as u64) * (height as u64)) as f64 / (grid as f64 * grid as f64))
        .sqrt()
        .floor() as u32;
    let dim = dim.max(1);

    // Halve the leftover margin only once it exceeds a single pixel; a
    // 1-pixel leftover stays whole rather than being split into two halves.
    let h_raw = width.saturating_sub(dim * grid);
    let h_offset = if h_raw > 1 { h_raw / 2 } else { h_raw };
    let v_raw = height.saturating_sub(dim * grid);
    let v_offset = if v_raw > 1 { v_raw / 2 } else { v_raw };

    BlockGrid {
        grid,
        dim,
        h_offset,
        v_offset,
    }
}

/// Tiled square blocks, `(row, col)` argument order, with symmetric
/// edge-extension guards so the first/last row and column of the grid absorb
/// whatever the grid dimension doesn't evenly divide. `None` when rank `r`'s
/// tile lies entirely outside the image (only possible when `proc_count` is
/// not a perfect square).
pub fn tiled_blocks(width: u32, height: u32, proc_count: u32, rank: u32) -> Option<Rect> {
    if proc_count == 0 || width == 0 || height == 0 || rank >= proc_count {
        return None;
    }
    let BlockGrid {
        grid,
        dim,
        h_offset,
        v_offset,
    } = block_grid(width, height, proc_count);

    let mut first_col = (rank % grid) * dim + h_offset;
    let mut last_col = first_col + dim - 1;
    let mut first_row = (rank / grid) * dim + v_offset;
    let mut last_row = first_row + dim - 1;

    if first_col == h_offset {
        first_col = 0;
    }
    if (rank % grid) == grid - 1 {
        last_col = width - 1;
    }
    if first_row == v_offset {
        first_row = 0;
    }
    if last_row == dim * grid + v_offset || (proc_count - rank - 1) < grid {
        last_row = height - 1;
    }

    if first_col >= width || first_row >= height {
        return None;
    }
    last_col = last_col.min(width - 1);
    last_row = last_row.min(height - 1);

    Some(Rect {
        first_row,
        last_row,
        first_col,
        last_col,
    })
}

/// Interleaved row cycles: rank `r` owns
/// `{ r*b + k*b*P + j : k >= 0, 0 <= j < b, row < height }`, ascending.
pub fn interleaved_cycles(height: u32, proc_count: u32, rank: u32, cycle_size: u32) -> Vec<u32> {
    let mut rows = Vec::new();
    if proc_count == 0 || cycle_size == 0 {
        return rows;
    }
    let mut start_row = rank * cycle_size;
    while start_row < height {
        for j in 0..cycle_size {
            let row = start_row + j;
            if row < height {
                rows.push(row);
            }
        }
        start_row += cycle_size * proc_count;
    }
    rows
}

/// Generates the dynamic-mode tile queue in row-major order, clipping
/// right/bottom tiles to image bounds.
pub fn generate_tiles(width: u32, height: u32, block_width: u32, block_height: u32) -> VecDeque<WorkUnit> {
    let mut queue = VecDeque::new();
    if block_width == 0 || block_height == 0 {
        return queue;
    }
    let mut row = 0;
    while row < height {
        let tile_height = block_height.min(height - row);
        let mut col = 0;
        while col < width {
            let tile_width = block_width.min(width - col);
            queue.push_back(WorkUnit {
                start_row: row,
                start_col: col,
                tile_width,
                tile_height,
            });
            col += block_width;
        }
        row += block_height;
    }
    queue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_full_coverage_no_overlap(width: u32, height: u32, rects: &[Option<Rect>]) {
        let mut covered = vec![false; (width * height) as usize];
        for rect in rects.iter().flatten() {
            for row in rect.first_row..=rect.last_row {
                for col in rect.first_col..=rect.last_col {
                    let idx = (row * width + col) as usize;
                    assert!(!covered[idx], "pixel ({row},{col}) covered twice");
                    covered[idx] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c), "not every pixel was covered");
    }

    #[test]
    fn vertical_strips_cover_image_exactly_once() {
        for (width, height, p) in [(10u32, 2u32, 3u32), (7, 5, 4), (100, 1, 7), (16, 16, 16)] {
            let rects: Vec<_> = (0..p).map(|r| vertical_strips(width, height, p, r)).collect();
            assert_full_coverage_no_overlap(width, height, &rects);
        }
    }

    #[test]
    fn vertical_strips_splits_uneven_width_with_remainder_on_last_rank() {
        let r0 = vertical_strips(10, 2, 3, 0).unwrap();
        let r1 = vertical_strips(10, 2, 3, 1).unwrap();
        let r2 = vertical_strips(10, 2, 3, 2).unwrap();
        assert_eq!((r0.first_col, r0.last_col), (0, 2));
        assert_eq!((r1.first_col, r1.last_col), (3, 5));
        assert_eq!((r2.first_col, r2.last_col), (6, 9));
    }

    #[test]
    fn tiled_blocks_cover_image_exactly_once() {
        for (width, height, p) in [(6u32, 6u32, 4u32), (6, 6, 5), (20, 12, 7), (8, 8, 1)] {
            let rects: Vec<_> = (0..p).map(|r| tiled_blocks(width, height, p, r)).collect();
            assert_full_coverage_no_overlap(width, height, &rects);
        }
    }

    #[test]
    fn tiled_blocks_first_rank_starts_at_image_origin() {
        let r0 = tiled_blocks(6, 6, 4, 0).unwrap();
        assert_eq!(r0.first_col, 0);
        assert_eq!(r0.first_row, 0);
    }

    #[test]
    fn tiled_blocks_can_be_empty_for_non_square_proc_count() {
        // width=4, height=20, proc_count=4 -> grid=2, dim=4, so the grid is
        // twice as wide as the image; ranks in the second grid column start
        // past the right edge and return None, while the first-column ranks
        // absorb the whole width between them.
        let width = 4u32;
        let height = 20u32;
        let p = 4u32;
        let rects: Vec<_> = (0..p).map(|r| tiled_blocks(width, height, p, r)).collect();
        assert!(rects.iter().any(|r| r.is_none()));
        assert_full_coverage_no_overlap(width, height, &rects);
    }

    #[test]
    fn interleaved_cycles_assigns_alternating_row_groups() {
        let rank0 = interleaved_cycles(8, 2, 0, 2);
        let rank1 = interleaved_cycles(8, 2, 1, 2);
        assert_eq!(rank0, vec![0, 1, 4, 5]);
        assert_eq!(rank1, vec![2, 3, 6, 7]);
    }

    #[test]
    fn interleaved_cycles_cover_every_row_exactly_once() {
        for (height, p, cycle) in [(8u32, 2u32, 2u32), (17, 4, 3), (5, 5, 1), (100, 3, 7)] {
            let mut seen = vec![0u32; height as usize];
            for r in 0..p {
                for row in interleaved_cycles(height, p, r, cycle) {
                    seen[row as usize] += 1;
                }
            }
            assert!(seen.iter().all(|&c| c == 1), "rows must be owned exactly once");
        }
    }

    #[test]
    fn interleaved_cycles_ascending_order() {
        let rows = interleaved_cycles(100, 3, 1, 4);
        let mut sorted = rows.clone();
        sorted.sort_unstable();
        assert_eq!(rows, sorted);
    }

    #[test]
    fn dynamic_tiles_clip_to_bounds_and_are_row_major() {
        let tiles: Vec<_> = generate_tiles(8, 8, 4, 4).into_iter().collect();
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles[0].start_row, 0);
        assert_eq!(tiles[0].start_col, 0);
        assert_eq!(tiles[1].start_col, 4);
        assert_eq!(tiles[2].start_row, 4);
        for tile in &tiles {
            assert_eq!(tile.tile_width, 4);
            assert_eq!(tile.tile_height, 4);
        }
    }

    #[test]
    fn dynamic_tiles_clip_trailing_partial_tile() {
        let tiles: Vec<_> = generate_tiles(10, 5, 4, 4).into_iter().collect();
        // columns: 0-3, 4-7, 8-9(clipped to 2) ; rows: 0-3, 4(clipped to 1)
        let last_col_tile = tiles.iter().find(|t| t.start_col == 8).unwrap();
        assert_eq!(last_col_tile.tile_width, 2);
        let last_row_tile = tiles.iter().find(|t| t.start_row == 4).unwrap();
        assert_eq!(last_row_tile.tile_height, 1);
    }

    #[test]
    fn dynamic_tiles_exactly_partition_the_image() {
        let width = 17u32;
        let height = 13u32;
        let tiles = generate_tiles(width, height, 5, 6);
        let mut covered = vec![false; (width * height) as usize];
        for tile in &tiles {
            for row in tile.start_row..tile.start_row + tile.tile_height {
                for col in tile.start_col..tile.start_col + tile.tile_width {
                    let idx = (row * width + col) as usize;
                    assert!(!covered[idx]);
                    covered[idx] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c));
    }
}
