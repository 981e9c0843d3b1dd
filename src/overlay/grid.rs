use anyhow::Result;
use bitflags::bitflags;

use crate::map::player::Player;
use crate::map::{Direction, GameMap};

/// First tile id of the collision tileset. Cell values are `TILE_OFFSET + mask`.
pub const TILE_OFFSET: u16 = 384;

bitflags! {
    /// Directions in which leaving a tile is blocked. Bit order matches `Direction::bit`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockedDirs: u8 {
        const DOWN = 1 << 0;
        const LEFT = 1 << 1;
        const RIGHT = 1 << 2;
        const UP = 1 << 3;
    }
}

impl BlockedDirs {
    pub fn from_direction(direction: Direction) -> Self {
        Self::from_bits_truncate(direction.bit())
    }
}

/// Movement query the grid is computed from.
pub trait Passability {
    fn passable(&mut self, map: &GameMap, player: &Player, x: i32, y: i32, direction: Direction) -> Result<bool>;
}

impl<F> Passability for F
where
    F: FnMut(&GameMap, &Player, i32, i32, Direction) -> Result<bool>,
{
    fn passable(&mut self, map: &GameMap, player: &Player, x: i32, y: i32, direction: Direction) -> Result<bool> {
        self(map, player, x, y, direction)
    }
}

/// The player's own movement rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlayerPassability;

impl Passability for PlayerPassability {
    fn passable(&mut self, map: &GameMap, player: &Player, x: i32, y: i32, direction: Direction) -> Result<bool> {
        Ok(player.passable(map, x, y, direction))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionGrid {
    width: i32,
    height: i32,
    cells: Vec<u16>,
}

impl CollisionGrid {
    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Row-major cell values; 0 for fully open tiles.
    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    pub fn get(&self, x: i32, y: i32) -> Option<u16> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get((x + y * self.width) as usize).copied()
    }

    pub fn mask(&self, x: i32, y: i32) -> Option<BlockedDirs> {
        let cell = self.get(x, y)?;
        if cell == 0 {
            return Some(BlockedDirs::empty());
        }
        Some(BlockedDirs::from_bits_truncate(cell.saturating_sub(TILE_OFFSET) as u8))
    }

    pub fn blocked_tiles(&self) -> usize {
        self.cells.iter().filter(|cell| **cell != 0).count()
    }

    /// One character per tile: `.` when open, otherwise the mask as a hex digit.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(((self.width + 1) * self.height.max(0)) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let mask = self.mask(x, y).unwrap_or_default();
                if mask.is_empty() {
                    out.push('.');
                } else {
                    out.push(char::from_digit(u32::from(mask.bits()), 16).unwrap_or('?'));
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Moves the player off the map and puts it back when dropped, so every exit path restores it.
struct PlayerRelocation<'a> {
    player: &'a mut Player,
    saved: (i32, i32),
}

impl<'a> PlayerRelocation<'a> {
    fn new(player: &'a mut Player, x: i32, y: i32) -> Self {
        let saved = player.position();
        player.moveto(x, y);
        Self { player, saved }
    }

    fn player(&self) -> &Player {
        self.player
    }
}

impl Drop for PlayerRelocation<'_> {
    fn drop(&mut self) {
        let (x, y) = self.saved;
        self.player.moveto(x, y);
    }
}

/// Queries every tile in every direction. The player stands at (-1, -1) for the duration so its
/// own tile reads as free.
pub fn compute_grid(map: &GameMap, player: &mut Player, query: &mut impl Passability) -> Result<CollisionGrid> {
    let relocation = PlayerRelocation::new(player, -1, -1);
    let (width, height) = (map.width().max(0), map.height().max(0));
    let mut cells = vec![0u16; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            let mut mask = BlockedDirs::empty();
            for direction in Direction::ALL {
                if !query.passable(map, relocation.player(), x, y, direction)? {
                    mask |= BlockedDirs::from_direction(direction);
                }
            }
            if !mask.is_empty() {
                cells[(x + y * width) as usize] = TILE_OFFSET + u16::from(mask.bits());
            }
        }
    }
    Ok(CollisionGrid { width, height, cells })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Tileset;
    use std::panic::{self, AssertUnwindSafe};

    fn open_map(width: u32, height: u32) -> GameMap {
        let mut priorities = vec![0; 512];
        priorities[0] = 5;
        GameMap::new(1, width, height, Tileset { id: 1, passages: vec![0; 512], priorities, ..Tileset::default() })
    }

    #[test]
    fn edges_block_outward_moves() {
        let map = open_map(3, 2);
        let mut player = Player::at(1, 1);
        let grid = compute_grid(&map, &mut player, &mut PlayerPassability).expect("grid");
        assert_eq!(grid.mask(0, 0), Some(BlockedDirs::LEFT | BlockedDirs::UP));
        assert_eq!(grid.get(2, 1), Some(TILE_OFFSET + (BlockedDirs::RIGHT | BlockedDirs::DOWN).bits() as u16));
        assert_eq!(grid.blocked_tiles(), 6);
        assert_eq!(grid.to_text(), "a8c\n315\n");
        assert_eq!(player.position(), (1, 1));
    }

    #[test]
    fn player_tile_is_not_self_blocking() {
        let map = open_map(3, 3);
        let mut player = Player::at(1, 1);
        let grid = compute_grid(&map, &mut player, &mut PlayerPassability).expect("grid");
        assert_eq!(grid.get(1, 1), Some(0));
        assert_eq!(grid.mask(1, 0), Some(BlockedDirs::UP), "moving down onto the player is allowed");
    }

    #[test]
    fn fully_open_interior_is_zero() {
        let map = open_map(5, 5);
        let mut player = Player::at(0, 0);
        let grid = compute_grid(&map, &mut player, &mut PlayerPassability).expect("grid");
        assert_eq!(grid.get(2, 2), Some(0));
        assert_eq!(grid.mask(2, 2), Some(BlockedDirs::empty()));
        assert_eq!(grid.get(5, 0), None);
    }

    #[test]
    fn query_sees_relocated_player() {
        let map = open_map(2, 2);
        let mut player = Player::at(1, 0);
        let mut query = |_: &GameMap, player: &Player, _: i32, _: i32, _: Direction| -> Result<bool> {
            assert_eq!(player.position(), (-1, -1));
            Ok(true)
        };
        let grid = compute_grid(&map, &mut player, &mut query).expect("grid");
        assert_eq!(grid.blocked_tiles(), 0);
        assert_eq!(player.position(), (1, 0));
    }

    #[test]
    fn player_is_restored_after_a_failing_query() {
        let map = open_map(4, 4);
        let mut player = Player::at(2, 3);
        let mut calls = 0;
        let mut query = |_: &GameMap, _: &Player, _: i32, _: i32, _: Direction| -> Result<bool> {
            calls += 1;
            if calls == 7 {
                anyhow::bail!("passability backend went away");
            }
            Ok(true)
        };
        assert!(compute_grid(&map, &mut player, &mut query).is_err());
        assert_eq!(player.position(), (2, 3));
    }

    #[test]
    fn player_is_restored_after_a_panicking_query() {
        let map = open_map(4, 4);
        let mut player = Player::at(3, 1);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut query = |_: &GameMap, _: &Player, x: i32, _: i32, _: Direction| -> Result<bool> {
                if x == 2 {
                    panic!("injected fault");
                }
                Ok(true)
            };
            let _ = compute_grid(&map, &mut player, &mut query);
        }));
        assert!(result.is_err());
        assert_eq!(player.position(), (3, 1));
    }
}
