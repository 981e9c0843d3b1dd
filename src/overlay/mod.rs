//! Debug collision overlay: a tile layer over the map showing, per tile, which directions the
//! player cannot leave in.

pub mod backend;
pub mod grid;

use std::any::Any;

use anyhow::Result;

use crate::config::{OverlayConfig, ScreenConfig};
use crate::events::FieldEvent;
use crate::input::{Input, InputButton};
use crate::map::player::Player;
use crate::map::{GameMap, DISPLAY_UNITS_PER_PIXEL, TILE_SIZE};
use crate::plugins::{FieldContext, FieldPlugin};

use backend::{OverlayBackend, TilemapId, ViewportId, ViewportRect};
use grid::{compute_grid, CollisionGrid, PlayerPassability};

struct OverlayResources {
    viewport: ViewportId,
    tilemap: Option<TilemapId>,
}

pub struct CollisionOverlay<B: OverlayBackend> {
    config: OverlayConfig,
    screen: ScreenConfig,
    backend: B,
    enabled: bool,
    resources: Option<OverlayResources>,
    grid: Option<CollisionGrid>,
    /// Data generation the grid was computed against.
    generation: u64,
}

impl<B: OverlayBackend> CollisionOverlay<B> {
    pub fn new(config: &OverlayConfig, screen: ScreenConfig, backend: B) -> Self {
        Self { config: config.clone(), screen, backend, enabled: false, resources: None, grid: None, generation: 0 }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn grid(&self) -> Option<&CollisionGrid> {
        self.grid.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Releases whatever is alive, then allocates fresh resources and computes the grid for `map`.
    /// On failure nothing stays allocated and the overlay is off.
    pub fn show(&mut self, map: &GameMap, player: &mut Player) -> Result<&CollisionGrid> {
        self.dispose();
        if let Err(err) = self.allocate_and_bind(map, player) {
            self.dispose();
            self.enabled = false;
            return Err(err);
        }
        self.enabled = true;
        self.backend.frame_reset();
        match &self.grid {
            Some(grid) => {
                tracing::debug!(
                    target: "field::overlay",
                    map_id = map.map_id(),
                    blocked = grid.blocked_tiles(),
                    "collision overlay shown"
                );
                Ok(grid)
            }
            None => anyhow::bail!("collision grid missing after show"),
        }
    }

    pub fn hide(&mut self) {
        self.dispose();
        self.enabled = false;
    }

    /// Tracks the map scroll. Display units are quarter pixels.
    pub fn follow(&mut self, map: &GameMap) {
        if !self.enabled {
            return;
        }
        if let Some(tilemap) = self.resources.as_ref().and_then(|res| res.tilemap) {
            self.backend.set_origin(
                tilemap,
                map.display_x / DISPLAY_UNITS_PER_PIXEL,
                map.display_y / DISPLAY_UNITS_PER_PIXEL,
            );
        }
    }

    fn allocate_and_bind(&mut self, map: &GameMap, player: &mut Player) -> Result<()> {
        let rect = ViewportRect { x: 0, y: 0, width: self.screen.width, height: self.screen.height };
        let viewport = self.backend.create_viewport(rect, self.config.z)?;
        self.resources = Some(OverlayResources { viewport, tilemap: None });

        let columns = (self.screen.width / TILE_SIZE + 2) as u32;
        let rows = (self.screen.height / TILE_SIZE + 2) as u32;
        let tilemap = self.backend.create_tilemap(viewport, columns, rows, &self.config.tileset)?;
        self.resources = Some(OverlayResources { viewport, tilemap: Some(tilemap) });

        let grid = compute_grid(map, player, &mut PlayerPassability)?;
        self.backend.bind_map_data(tilemap, &grid)?;
        self.grid = Some(grid);
        self.enabled = true;
        self.follow(map);
        Ok(())
    }

    fn dispose(&mut self) {
        if let Some(resources) = self.resources.take() {
            if let Some(tilemap) = resources.tilemap {
                self.backend.dispose_tilemap(tilemap);
            }
            self.backend.dispose_viewport(resources.viewport);
        }
        self.grid = None;
    }

    fn toggle(&mut self, ctx: &mut FieldContext) -> Result<()> {
        if self.enabled {
            self.hide();
            ctx.emit(FieldEvent::OverlayHidden);
            return Ok(());
        }
        self.show_current(ctx)
    }

    fn show_current(&mut self, ctx: &mut FieldContext) -> Result<()> {
        let map_id = ctx.map_id();
        let blocked_tiles = self.show(&ctx.snapshot.map, &mut ctx.player)?.blocked_tiles();
        self.generation = ctx.data_generation;
        ctx.emit(FieldEvent::OverlayShown { map_id, blocked_tiles });
        Ok(())
    }
}

impl<B: OverlayBackend + 'static> FieldPlugin for CollisionOverlay<B> {
    fn name(&self) -> &'static str {
        "collision_overlay"
    }

    fn update(&mut self, ctx: &mut FieldContext, input: &Input) -> Result<()> {
        if !ctx.debug.enabled() || !ctx.scene.is_map() {
            return Ok(());
        }
        if input.trigger(InputButton::DebugOverlay) {
            self.toggle(ctx)?;
        } else if self.enabled && self.generation != ctx.data_generation {
            tracing::debug!(target: "field::overlay", map_id = ctx.map_id(), "recomputing overlay after reload");
            self.show_current(ctx)?;
        }
        self.follow(&ctx.snapshot.map);
        Ok(())
    }

    fn on_transfer(&mut self, ctx: &mut FieldContext, from: u32, to: u32) -> Result<()> {
        if self.enabled {
            tracing::debug!(target: "field::overlay", from, to, "hiding overlay for map transfer");
            ctx.emit(FieldEvent::OverlayHidden);
        }
        self.hide();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::backend::HeadlessBackend;
    use super::*;
    use crate::data::Tileset;

    fn overlay() -> CollisionOverlay<HeadlessBackend> {
        CollisionOverlay::new(&OverlayConfig::default(), ScreenConfig::default(), HeadlessBackend::new())
    }

    fn map() -> GameMap {
        let mut priorities = vec![0; 512];
        priorities[0] = 5;
        GameMap::new(2, 30, 20, Tileset { id: 1, passages: vec![0; 512], priorities, ..Tileset::default() })
    }

    #[test]
    fn show_allocates_viewport_and_screen_sized_tilemap() {
        let mut overlay = overlay();
        let mut player = Player::at(3, 3);
        overlay.show(&map(), &mut player).expect("show");
        assert!(overlay.enabled());
        assert_eq!(overlay.backend().live_resources(), 2);
        assert_eq!(overlay.backend().frame_resets(), 1);
        let tilemap = overlay.backend().tilemaps().next().expect("tilemap");
        assert_eq!((tilemap.columns, tilemap.rows), (22, 17));
        assert_eq!(tilemap.tileset, "debug_collision");
        assert_eq!(tilemap.blocked_tiles, Some(overlay.grid().expect("grid").blocked_tiles()));
    }

    #[test]
    fn hide_then_show_does_not_leak() {
        let mut overlay = overlay();
        let mut player = Player::at(3, 3);
        let map = map();
        let baseline = overlay.backend().live_resources();
        overlay.show(&map, &mut player).expect("show");
        overlay.hide();
        assert_eq!(overlay.backend().live_resources(), baseline);
        assert!(!overlay.enabled());
        overlay.show(&map, &mut player).expect("show again");
        assert_eq!(overlay.backend().live_resources(), baseline + 2);
        // Showing while shown releases the old pair first.
        overlay.show(&map, &mut player).expect("reshow");
        assert_eq!(overlay.backend().live_resources(), baseline + 2);
        assert_eq!(overlay.backend().allocations(), 6);
    }

    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let mut overlay = overlay();
        let mut player = Player::at(0, 0);
        overlay.backend_mut().fail_tilemaps(true);
        assert!(overlay.show(&map(), &mut player).is_err());
        assert!(!overlay.enabled());
        assert_eq!(overlay.backend().live_resources(), 0);
        assert!(overlay.grid().is_none());
    }

    #[test]
    fn origin_tracks_scroll_in_pixels() {
        let mut overlay = overlay();
        let mut player = Player::at(0, 0);
        let mut map = map();
        overlay.show(&map, &mut player).expect("show");
        map.display_x = 1024;
        map.display_y = 260;
        overlay.follow(&map);
        let tilemap = overlay.backend().tilemaps().next().expect("tilemap");
        assert_eq!(tilemap.origin, (256, 65));
    }
}
