//! Tile bookkeeping for budgeted accumulation.
//!
//! A frame buffer is partitioned into square tiles by a raster sweep. The
//! [`TileScheduler`] hands those tiles out one at a time, visiting every tile
//! exactly once per pass and reshuffling the visitation order when a pass
//! completes.

mod scheduler;

pub use scheduler::TileScheduler;

pub const DEFAULT_TILE_SIZE: u32 = 128;
/// Compute kernels run 8x8 workgroups, so tile sizes must be multiples of this.
pub const TILE_WORKGROUP_EDGE: u32 = 8;

/// Top-left corner of one tile, in frame buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameExtent {
    pub width: u32,
    pub height: u32,
}

impl FrameExtent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl Tile {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Width and height of the part of this tile that lies inside `frame`.
    ///
    /// Edge tiles may extend past the frame; the list keeps them whole and the
    /// kernel clamps, so this is only used for diagnostics and tests.
    pub fn clamped_extent(self, tile_size: u32, frame: FrameExtent) -> (u32, u32) {
        let width = frame.width.saturating_sub(self.x).min(tile_size);
        let height = frame.height.saturating_sub(self.y).min(tile_size);
        (width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TileSchedulerError {
    #[error("frame extent {width}x{height} has zero area")]
    EmptyFrame { width: u32, height: u32 },
    #[error("tile size must be at least 1")]
    ZeroTileSize,
    #[error("tile count for {width}x{height} at tile size {tile_size} overflows usize")]
    TileCountOverflow {
        width: u32,
        height: u32,
        tile_size: u32,
    },
}

/// Number of tiles covering `frame`: `ceil(W/T) * ceil(H/T)`.
pub fn tile_count(frame: FrameExtent, tile_size: u32) -> Result<usize, TileSchedulerError> {
    validate_layout(frame, tile_size)?;
    let tiles_per_row = frame.width.div_ceil(tile_size) as usize;
    let tiles_per_column = frame.height.div_ceil(tile_size) as usize;
    tiles_per_row
        .checked_mul(tiles_per_column)
        .ok_or(TileSchedulerError::TileCountOverflow {
            width: frame.width,
            height: frame.height,
            tile_size,
        })
}

/// Deterministic raster sweep: x is the outer axis, y the inner one.
pub fn raster_tiles(frame: FrameExtent, tile_size: u32) -> Result<Vec<Tile>, TileSchedulerError> {
    let count = tile_count(frame, tile_size)?;
    Ok(raster_sweep(frame, tile_size, count))
}

/// Sweep over a layout that `tile_count` has already accepted.
fn raster_sweep(frame: FrameExtent, tile_size: u32, count: usize) -> Vec<Tile> {
    let step = tile_size.max(1) as usize;
    let mut tiles = Vec::with_capacity(count);
    for x in (0..frame.width).step_by(step) {
        for y in (0..frame.height).step_by(step) {
            tiles.push(Tile { x, y });
        }
    }
    debug_assert_eq!(tiles.len(), count);
    tiles
}

fn validate_layout(frame: FrameExtent, tile_size: u32) -> Result<(), TileSchedulerError> {
    if frame.is_empty() {
        return Err(TileSchedulerError::EmptyFrame {
            width: frame.width,
            height: frame.height,
        });
    }
    if tile_size == 0 {
        return Err(TileSchedulerError::ZeroTileSize);
    }
    Ok(())
}
