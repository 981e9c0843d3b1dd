use super::{Direction, GameMap};

/// The player character. Its tile position is authoritative and survives reloads; scroll state
/// lives on the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    pub through: bool,
    pub character_name: String,
}

impl Default for Player {
    fn default() -> Self {
        Self { x: 0, y: 0, direction: Direction::Down, through: false, character_name: "hero".to_string() }
    }
}

impl Player {
    pub fn at(x: i32, y: i32) -> Self {
        Self { x, y, ..Self::default() }
    }

    pub fn moveto(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Whether a character standing on `(x, y)` may step towards `direction`.
    pub fn passable(&self, map: &GameMap, x: i32, y: i32, direction: Direction) -> bool {
        let (dx, dy) = direction.offset();
        let (next_x, next_y) = (x + dx, y + dy);
        if !map.valid(next_x, next_y) {
            return false;
        }
        if self.through {
            return true;
        }
        if !map.passable(x, y, direction, None) || !map.passable(next_x, next_y, direction.reverse(), None) {
            return false;
        }
        let occupied = map.events().any(|event| {
            event.x == next_x && event.y == next_y && !event.through && !event.character_name.is_empty()
        });
        if occupied {
            return false;
        }
        // A visible player blocks its own tile.
        !(self.x == next_x && self.y == next_y && !self.character_name.is_empty())
    }

    /// Steps one tile if passable. `walk_through` skips collision but never leaves the map.
    pub fn move_straight(&mut self, map: &GameMap, direction: Direction, walk_through: bool) -> bool {
        self.direction = direction;
        let (dx, dy) = direction.offset();
        let (next_x, next_y) = (self.x + dx, self.y + dy);
        let allowed = if walk_through {
            map.valid(next_x, next_y)
        } else {
            self.passable(map, self.x, self.y, direction)
        };
        if allowed {
            self.moveto(next_x, next_y);
        }
        allowed
    }
}
