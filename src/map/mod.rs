pub mod event;
pub mod player;
pub mod self_switches;

use std::collections::BTreeMap;

use crate::config::ScreenConfig;
use crate::data::{DataTables, MapData, Tileset};
use event::MapEvent;
use self_switches::SelfSwitches;

pub const TILE_SIZE: i32 = 32;
/// Scroll positions are stored in quarter pixels.
pub const DISPLAY_UNITS_PER_TILE: i32 = 128;
pub const DISPLAY_UNITS_PER_PIXEL: i32 = DISPLAY_UNITS_PER_TILE / TILE_SIZE;
pub const LAYERS: usize = 3;
/// Largest width or height a map may have.
pub const MAX_MAP_SIDE: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Down = 2,
    Left = 4,
    Right = 6,
    Up = 8,
}

impl Direction {
    /// Ordered by mask bit: down, left, right, up.
    pub const ALL: [Direction; 4] = [Direction::Down, Direction::Left, Direction::Right, Direction::Up];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(Direction::Down),
            4 => Some(Direction::Left),
            6 => Some(Direction::Right),
            8 => Some(Direction::Up),
            _ => None,
        }
    }

    pub fn bit_index(self) -> u32 {
        u32::from(self.code()) / 2 - 1
    }

    pub fn bit(self) -> u8 {
        1 << self.bit_index()
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
        }
    }

    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::Up => (0, -1),
        }
    }
}

/// The active map: tiles, collision tables and the live event set.
#[derive(Debug, Clone, Default)]
pub struct GameMap {
    map_id: u32,
    width: i32,
    height: i32,
    tileset: Tileset,
    data: Vec<u16>,
    events: BTreeMap<u32, MapEvent>,
    pub need_refresh: bool,
    pub display_x: i32,
    pub display_y: i32,
}

impl GameMap {
    pub fn new(map_id: u32, width: u32, height: u32, tileset: Tileset) -> Self {
        // Clamped so index arithmetic stays inside i32; loaded maps are rejected before this.
        let width = width.min(MAX_MAP_SIDE) as i32;
        let height = height.min(MAX_MAP_SIDE) as i32;
        Self {
            map_id,
            width,
            height,
            tileset,
            data: vec![0; (width * height) as usize * LAYERS],
            events: BTreeMap::new(),
            need_refresh: false,
            display_x: 0,
            display_y: 0,
        }
    }

    /// Builds the live map from its data file. Event pages are selected against `switches`.
    pub fn setup(map_id: u32, data: MapData, tables: &DataTables, switches: &SelfSwitches) -> Self {
        let tileset = match tables.tileset(data.tileset_id) {
            Some(tileset) => tileset.clone(),
            None => {
                tracing::warn!(
                    target: "field::map",
                    map_id,
                    tileset_id = data.tileset_id,
                    "map references a missing tileset; treating every tile as open"
                );
                Tileset { id: data.tileset_id, ..Tileset::default() }
            }
        };
        let mut map = Self::new(map_id, data.width, data.height, tileset);
        if data.data.len() == map.data.len() {
            map.data = data.data;
        } else {
            tracing::warn!(
                target: "field::map",
                map_id,
                expected = map.data.len(),
                found = data.data.len(),
                "tile layer size mismatch; padding with empty tiles"
            );
            let mut tiles = data.data;
            tiles.resize(map.data.len(), 0);
            map.data = tiles;
        }
        for event_data in data.events {
            let event = MapEvent::from_data(event_data);
            map.events.insert(event.id, event);
        }
        map.refresh(switches);
        map
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tileset(&self) -> &Tileset {
        &self.tileset
    }

    pub fn valid(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    pub fn tile_id(&self, x: i32, y: i32, layer: usize) -> Option<u16> {
        if !self.valid(x, y) || layer >= LAYERS {
            return None;
        }
        let index = (x + y * self.width) as usize + layer * (self.width * self.height) as usize;
        self.data.get(index).copied()
    }

    pub fn set_tile(&mut self, x: i32, y: i32, layer: usize, tile_id: u16) {
        if !self.valid(x, y) || layer >= LAYERS {
            return;
        }
        let index = (x + y * self.width) as usize + layer * (self.width * self.height) as usize;
        if let Some(slot) = self.data.get_mut(index) {
            *slot = tile_id;
        }
    }

    pub fn insert_event(&mut self, event: MapEvent) {
        self.events.insert(event.id, event);
    }

    pub fn events(&self) -> impl Iterator<Item = &MapEvent> {
        self.events.values()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn event_by_id(&self, id: u32) -> Option<&MapEvent> {
        self.events.get(&id)
    }

    pub fn event_by_id_mut(&mut self, id: u32) -> Option<&mut MapEvent> {
        self.events.get_mut(&id)
    }

    /// First event, in ascending id order, whose name matches exactly. Duplicate names therefore
    /// always resolve to the lowest id.
    pub fn event_by_name(&self, name: &str) -> Option<(u32, &MapEvent)> {
        self.events.iter().find(|(_, event)| event.name == name).map(|(id, event)| (*id, event))
    }

    pub fn refresh(&mut self, switches: &SelfSwitches) {
        let map_id = self.map_id;
        for event in self.events.values_mut() {
            event.refresh(map_id, switches);
        }
        self.need_refresh = false;
    }

    /// Tile-level passability out of `(x, y)` towards `direction`. Tile-graphic events on the
    /// tile are consulted before the three tile layers, top layer first. `self_event` is skipped.
    pub fn passable(&self, x: i32, y: i32, direction: Direction, self_event: Option<u32>) -> bool {
        if !self.valid(x, y) {
            return false;
        }
        let bit = direction.bit();
        for event in self.events.values() {
            if Some(event.id) == self_event || event.x != x || event.y != y || event.through {
                continue;
            }
            match self.tile_rule(event.tile_id, bit) {
                TileRule::Blocked => return false,
                TileRule::Open => return true,
                TileRule::Continue => {}
            }
        }
        for layer in (0..LAYERS).rev() {
            let Some(tile_id) = self.tile_id(x, y, layer) else {
                return false;
            };
            match self.tile_rule(tile_id, bit) {
                TileRule::Blocked => return false,
                TileRule::Open => return true,
                TileRule::Continue => {}
            }
        }
        true
    }

    fn tile_rule(&self, tile_id: u16, bit: u8) -> TileRule {
        let passage = self.tileset.passage(tile_id);
        if passage & bit != 0 || passage & 0x0f == 0x0f {
            TileRule::Blocked
        } else if self.tileset.priority(tile_id) == 0 {
            TileRule::Open
        } else {
            TileRule::Continue
        }
    }

    /// Scrolls so that tile `(x, y)` sits in the middle of the screen, clamped to the map edges.
    pub fn center_on(&mut self, x: i32, y: i32, screen: ScreenConfig) {
        let center_x = (screen.width / 2 - TILE_SIZE / 2) * DISPLAY_UNITS_PER_PIXEL;
        let center_y = (screen.height / 2 - TILE_SIZE / 2) * DISPLAY_UNITS_PER_PIXEL;
        let max_x = (self.width - screen.width / TILE_SIZE) * DISPLAY_UNITS_PER_TILE;
        let max_y = (self.height - screen.height / TILE_SIZE) * DISPLAY_UNITS_PER_TILE;
        self.display_x = (x * DISPLAY_UNITS_PER_TILE - center_x).min(max_x).max(0);
        self.display_y = (y * DISPLAY_UNITS_PER_TILE - center_y).min(max_y).max(0);
    }
}

enum TileRule {
    Blocked,
    Open,
    Continue,
}
