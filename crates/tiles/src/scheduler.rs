use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{FrameExtent, Tile, TileSchedulerError, raster_sweep, tile_count};

/// Hands out tiles one at a time, one full pass at a time.
///
/// The tile list is built lazily by a raster sweep and shuffled before the
/// first pass. The cursor survives across frames; when it wraps past the last
/// tile the whole list is reshuffled before the next tile is returned, so
/// every pass visits each tile exactly once in a fresh order.
#[derive(Debug)]
pub struct TileScheduler {
    extent: FrameExtent,
    tile_size: u32,
    tile_count: usize,
    /// Empty until first use; a validated layout always has at least one tile.
    tiles: Vec<Tile>,
    cursor: usize,
    reshuffle_pending: bool,
    passes_completed: u64,
    rng: StdRng,
}

impl TileScheduler {
    pub fn new(extent: FrameExtent, tile_size: u32) -> Result<Self, TileSchedulerError> {
        Self::with_rng(extent, tile_size, StdRng::from_os_rng())
    }

    pub fn with_seed(
        extent: FrameExtent,
        tile_size: u32,
        seed: u64,
    ) -> Result<Self, TileSchedulerError> {
        Self::with_rng(extent, tile_size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        extent: FrameExtent,
        tile_size: u32,
        rng: StdRng,
    ) -> Result<Self, TileSchedulerError> {
        let tile_count = tile_count(extent, tile_size)?;
        Ok(Self {
            extent,
            tile_size,
            tile_count,
            tiles: Vec::new(),
            cursor: 0,
            reshuffle_pending: false,
            passes_completed: 0,
            rng,
        })
    }

    pub fn extent(&self) -> FrameExtent {
        self.extent
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed
    }

    pub fn is_built(&self) -> bool {
        !self.tiles.is_empty()
    }

    /// Current visitation order, or an empty slice before the list is built.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Builds the tile list on first use. Later calls leave it untouched.
    pub fn ensure_tile_list(&mut self) -> &[Tile] {
        if self.tiles.is_empty() {
            let mut tiles = raster_sweep(self.extent, self.tile_size, self.tile_count);
            tiles.shuffle(&mut self.rng);
            log::debug!(
                target: "tiles",
                "built tile list: extent={}x{} tile_size={} tiles={}",
                self.extent.width,
                self.extent.height,
                self.tile_size,
                tiles.len()
            );
            self.tiles = tiles;
        }
        &self.tiles
    }

    pub fn next_tile(&mut self) -> Tile {
        self.ensure_tile_list();
        let tiles = &mut self.tiles;

        if self.reshuffle_pending {
            self.reshuffle_pending = false;
            tiles.shuffle(&mut self.rng);
            log::trace!(
                target: "tiles",
                "tile pass {} complete, reshuffled {} tiles",
                self.passes_completed,
                tiles.len()
            );
        }

        let tile = tiles[self.cursor];
        self.cursor += 1;
        if self.cursor == tiles.len() {
            self.cursor = 0;
            self.reshuffle_pending = true;
            self.passes_completed += 1;
        }
        tile
    }

    /// Forgets the tile list for a new frame extent. The list is rebuilt on
    /// the next request and the cursor restarts at zero.
    pub fn reset(&mut self, extent: FrameExtent) -> Result<(), TileSchedulerError> {
        self.tile_count = tile_count(extent, self.tile_size)?;
        self.extent = extent;
        self.tiles.clear();
        self.cursor = 0;
        self.reshuffle_pending = false;
        Ok(())
    }
}
