use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use super::grid::CollisionGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilemapId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Host drawing primitives the overlay allocates through.
pub trait OverlayBackend {
    fn create_viewport(&mut self, rect: ViewportRect, z: i32) -> Result<ViewportId>;

    /// A tile surface of `columns` x `rows` visible cells drawing from `tileset`.
    fn create_tilemap(&mut self, viewport: ViewportId, columns: u32, rows: u32, tileset: &str) -> Result<TilemapId>;

    fn bind_map_data(&mut self, tilemap: TilemapId, grid: &CollisionGrid) -> Result<()>;

    fn set_origin(&mut self, tilemap: TilemapId, ox: i32, oy: i32);

    fn dispose_tilemap(&mut self, tilemap: TilemapId);

    fn dispose_viewport(&mut self, viewport: ViewportId);

    /// Tells the host a long operation just finished so it should not try to catch up frames.
    fn frame_reset(&mut self);

    /// Viewports plus tilemaps currently alive.
    fn live_resources(&self) -> usize;
}

/// Bookkeeping-only backend for headless sessions and tests.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    viewports: HashSet<ViewportId>,
    tilemaps: HashMap<TilemapId, HeadlessTilemap>,
    frame_resets: u32,
    allocations: u32,
    fail_tilemaps: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTilemap {
    pub viewport: ViewportId,
    pub columns: u32,
    pub rows: u32,
    pub tileset: String,
    pub origin: (i32, i32),
    pub blocked_tiles: Option<usize>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later tilemap allocation fail.
    pub fn fail_tilemaps(&mut self, fail: bool) {
        self.fail_tilemaps = fail;
    }

    pub fn frame_resets(&self) -> u32 {
        self.frame_resets
    }

    /// Total successful allocations over the backend's lifetime.
    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    pub fn tilemaps(&self) -> impl Iterator<Item = &HeadlessTilemap> {
        self.tilemaps.values()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.allocations += 1;
        self.next_id
    }
}

impl OverlayBackend for HeadlessBackend {
    fn create_viewport(&mut self, _rect: ViewportRect, _z: i32) -> Result<ViewportId> {
        let id = ViewportId(self.next());
        self.viewports.insert(id);
        Ok(id)
    }

    fn create_tilemap(&mut self, viewport: ViewportId, columns: u32, rows: u32, tileset: &str) -> Result<TilemapId> {
        if self.fail_tilemaps {
            bail!("tilemap allocation refused");
        }
        if !self.viewports.contains(&viewport) {
            bail!("viewport {viewport:?} is not alive");
        }
        let id = TilemapId(self.next());
        self.tilemaps.insert(
            id,
            HeadlessTilemap {
                viewport,
                columns,
                rows,
                tileset: tileset.to_string(),
                origin: (0, 0),
                blocked_tiles: None,
            },
        );
        Ok(id)
    }

    fn bind_map_data(&mut self, tilemap: TilemapId, grid: &CollisionGrid) -> Result<()> {
        match self.tilemaps.get_mut(&tilemap) {
            Some(entry) => {
                entry.blocked_tiles = Some(grid.blocked_tiles());
                Ok(())
            }
            None => bail!("tilemap {tilemap:?} is not alive"),
        }
    }

    fn set_origin(&mut self, tilemap: TilemapId, ox: i32, oy: i32) {
        if let Some(entry) = self.tilemaps.get_mut(&tilemap) {
            entry.origin = (ox, oy);
        }
    }

    fn dispose_tilemap(&mut self, tilemap: TilemapId) {
        self.tilemaps.remove(&tilemap);
    }

    fn dispose_viewport(&mut self, viewport: ViewportId) {
        self.viewports.remove(&viewport);
    }

    fn frame_reset(&mut self) {
        self.frame_resets += 1;
    }

    fn live_resources(&self) -> usize {
        self.viewports.len() + self.tilemaps.len()
    }
}
