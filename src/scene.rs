use std::rc::Rc;

use anyhow::{Context, Result};

use crate::bitmap_cache::{Bitmap, BitmapCache};
use crate::data::WorldSnapshot;
use crate::map::player::Player;

pub const TILESET_FOLDER: &str = "Graphics/Tilesets";
pub const CHARACTER_FOLDER: &str = "Graphics/Characters";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    Map,
    Menu,
    Battle,
    Title,
}

impl SceneKind {
    pub fn label(self) -> &'static str {
        match self {
            SceneKind::Map => "map",
            SceneKind::Menu => "menu",
            SceneKind::Battle => "battle",
            SceneKind::Title => "title",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CharacterSprite {
    /// `None` for the player.
    pub event_id: Option<u32>,
    pub bitmap: Rc<Bitmap>,
}

/// Scene-owned render state for the active map. Never patched in place: a new map or a data
/// reload builds a fresh one.
#[derive(Debug, Clone)]
pub struct MapScene {
    map_id: u32,
    tileset: Rc<Bitmap>,
    characters: Vec<CharacterSprite>,
}

impl MapScene {
    pub fn build(snapshot: &WorldSnapshot, player: &Player, bitmaps: &mut BitmapCache) -> Result<Self> {
        let map = &snapshot.map;
        let tileset_name = &map.tileset().tileset_name;
        let tileset = bitmaps
            .load(TILESET_FOLDER, tileset_name, 0)
            .with_context(|| format!("load tileset '{tileset_name}' for map {}", map.map_id()))?;
        let mut characters = Vec::new();
        for event in map.events().filter(|event| !event.character_name.is_empty()) {
            let bitmap = bitmaps
                .load(CHARACTER_FOLDER, &event.character_name, 0)
                .with_context(|| format!("load character '{}' for event {}", event.character_name, event.id))?;
            characters.push(CharacterSprite { event_id: Some(event.id), bitmap });
        }
        if !player.character_name.is_empty() {
            let bitmap = bitmaps
                .load(CHARACTER_FOLDER, &player.character_name, 0)
                .with_context(|| format!("load player character '{}'", player.character_name))?;
            characters.push(CharacterSprite { event_id: None, bitmap });
        }
        Ok(Self { map_id: map.map_id(), tileset, characters })
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn tileset(&self) -> &Bitmap {
        &self.tileset
    }

    pub fn characters(&self) -> &[CharacterSprite] {
        &self.characters
    }
}

#[derive(Debug, Clone)]
pub enum ActiveScene {
    Map(MapScene),
    Other(SceneKind),
}

impl ActiveScene {
    pub fn kind(&self) -> SceneKind {
        match self {
            ActiveScene::Map(_) => SceneKind::Map,
            ActiveScene::Other(kind) => *kind,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, ActiveScene::Map(_))
    }

    pub fn map_scene(&self) -> Option<&MapScene> {
        match self {
            ActiveScene::Map(scene) => Some(scene),
            ActiveScene::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap_cache::NullBitmapLoader;
    use crate::data::Tileset;
    use crate::map::event::{EventData, EventGraphic, EventPage, MapEvent};
    use crate::map::GameMap;

    #[test]
    fn build_collects_visible_characters() {
        let tileset = Tileset { id: 1, tileset_name: "outside".into(), ..Tileset::default() };
        let mut map = GameMap::new(1, 4, 4, tileset);
        let mut guard = MapEvent::from_data(EventData {
            id: 3,
            name: "Guard".into(),
            x: 1,
            y: 1,
            pages: vec![EventPage {
                graphic: EventGraphic { tile_id: 0, character_name: "soldier".into() },
                ..EventPage::default()
            }],
        });
        guard.refresh(1, &Default::default());
        map.insert_event(guard);
        map.insert_event(MapEvent::with_list(4, "Trigger", Vec::new()));
        let snapshot = WorldSnapshot { map, ..WorldSnapshot::default() };

        let mut bitmaps = BitmapCache::new(Box::new(NullBitmapLoader::default()));
        let scene = MapScene::build(&snapshot, &Player::default(), &mut bitmaps).expect("scene");
        assert_eq!(scene.map_id(), 1);
        assert_eq!(scene.tileset().source, "Graphics/Tilesets/outside");
        let owners: Vec<Option<u32>> = scene.characters().iter().map(|sprite| sprite.event_id).collect();
        assert_eq!(owners, vec![Some(3), None]);
    }

    #[test]
    fn only_the_map_scene_reports_as_map() {
        assert!(!ActiveScene::Other(SceneKind::Menu).is_map());
        assert_eq!(ActiveScene::Other(SceneKind::Battle).kind().label(), "battle");
    }
}
