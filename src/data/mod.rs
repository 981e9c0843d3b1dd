//! Loaded game data: the opaque tables the runtime carries around, the few tables it reads itself
//! (tilesets, common events), and the `WorldSnapshot` that bundles them with the active map.

mod source;

pub use source::{DataSource, FsDataSource};

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FieldError;
use crate::map::event::{EventData, Instruction};
use crate::map::self_switches::SelfSwitches;
use crate::map::{GameMap, LAYERS, MAX_MAP_SIDE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Actors,
    Items,
    Armors,
    Animations,
    Tilesets,
    CommonEvents,
}

impl TableKind {
    pub const ALL: [TableKind; 6] = [
        TableKind::Actors,
        TableKind::Items,
        TableKind::Armors,
        TableKind::Animations,
        TableKind::Tilesets,
        TableKind::CommonEvents,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TableKind::Actors => "Actors",
            TableKind::Items => "Items",
            TableKind::Armors => "Armors",
            TableKind::Animations => "Animations",
            TableKind::Tilesets => "Tilesets",
            TableKind::CommonEvents => "CommonEvents",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.label())
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label().eq_ignore_ascii_case(label))
    }
}

/// A table the runtime never looks inside. Records keep their on-disk order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    records: Vec<Value>,
}

impl DataTable {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tileset {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tileset_name: String,
    /// Indexed by tile id. Low nibble: blocked down/left/right/up.
    #[serde(default)]
    pub passages: Vec<u8>,
    #[serde(default)]
    pub priorities: Vec<u8>,
}

impl Tileset {
    pub fn passage(&self, tile_id: u16) -> u8 {
        self.passages.get(usize::from(tile_id)).copied().unwrap_or(0)
    }

    pub fn priority(&self, tile_id: u16) -> u8 {
        self.priorities.get(usize::from(tile_id)).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonEvent {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub list: Vec<Instruction>,
}

/// On-disk shape of a map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub tileset_id: u32,
    pub width: u32,
    pub height: u32,
    /// Three layers of `width * height` tile ids, layer-major.
    #[serde(default)]
    pub data: Vec<u16>,
    #[serde(default)]
    pub events: Vec<EventData>,
}

impl MapData {
    /// Number of tile slots across all layers. Fails on dimensions the runtime cannot address.
    pub fn tile_count(&self) -> anyhow::Result<usize> {
        if self.width > MAX_MAP_SIDE || self.height > MAX_MAP_SIDE {
            bail!("map is {}x{} tiles, limit is {MAX_MAP_SIDE} per side", self.width, self.height);
        }
        let width = usize::try_from(self.width)?;
        let height = usize::try_from(self.height)?;
        width
            .checked_mul(height)
            .and_then(|cells| cells.checked_mul(LAYERS))
            .ok_or_else(|| anyhow!("map is {}x{} tiles, too large to address", self.width, self.height))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataTables {
    pub actors: DataTable,
    pub items: DataTable,
    pub armors: DataTable,
    pub animations: DataTable,
    pub tilesets: Vec<Tileset>,
    pub common_events: Vec<CommonEvent>,
}

impl DataTables {
    /// Loads every table. The first table that fails to read or parse aborts the load.
    pub fn load(source: &dyn DataSource) -> Result<Self, FieldError> {
        Ok(Self {
            actors: DataTable::new(load_records(source, TableKind::Actors)?),
            items: DataTable::new(load_records(source, TableKind::Items)?),
            armors: DataTable::new(load_records(source, TableKind::Armors)?),
            animations: DataTable::new(load_records(source, TableKind::Animations)?),
            tilesets: load_typed(source, TableKind::Tilesets)?,
            common_events: load_typed(source, TableKind::CommonEvents)?,
        })
    }

    pub fn tileset(&self, id: u32) -> Option<&Tileset> {
        self.tilesets.iter().find(|tileset| tileset.id == id)
    }

    pub fn common_event(&self, id: u32) -> Option<&CommonEvent> {
        self.common_events.iter().find(|event| event.id == id)
    }
}

fn load_records(source: &dyn DataSource, kind: TableKind) -> Result<Vec<Value>, FieldError> {
    load_typed(source, kind)
}

fn load_typed<T: serde::de::DeserializeOwned>(
    source: &dyn DataSource,
    kind: TableKind,
) -> Result<Vec<T>, FieldError> {
    let path = source.table_path(kind);
    let parsed = source
        .read_bytes(&path)
        .and_then(|bytes| {
            serde_json::from_slice::<Vec<T>>(&bytes).with_context(|| format!("parse {}", path.display()))
        });
    parsed.map_err(|source| FieldError::ReloadCorruption { table: kind.label(), path, source })
}

pub fn load_map(source: &dyn DataSource, map_id: u32) -> Result<MapData, FieldError> {
    let path = source.map_path(map_id);
    let parsed = source.read_bytes(&path).and_then(|bytes| {
        let data =
            serde_json::from_slice::<MapData>(&bytes).with_context(|| format!("parse {}", path.display()))?;
        data.tile_count()?;
        Ok(data)
    });
    parsed.map_err(|source| FieldError::ReloadCorruption { table: "Map", path, source })
}

/// Hash of every table file plus the given map, used to confirm a data set is stable.
pub fn fingerprint(source: &dyn DataSource, map_id: u32) -> anyhow::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    for kind in TableKind::ALL {
        let path = source.table_path(kind);
        let bytes = source.read_bytes(&path)?;
        hasher.update(kind.label().as_bytes());
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    if map_id != 0 {
        let bytes = source.read_bytes(&source.map_path(map_id))?;
        hasher.update(b"Map");
        hasher.update(&bytes);
    }
    Ok(hasher.finalize())
}

/// Everything loaded from disk plus the live map. Replaced as a whole on reload.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub tables: DataTables,
    pub map: GameMap,
}

impl WorldSnapshot {
    /// Builds a complete snapshot without touching any existing one.
    pub fn load(source: &dyn DataSource, map_id: u32, switches: &SelfSwitches) -> Result<Self, FieldError> {
        let tables = DataTables::load(source)?;
        let map = if map_id == 0 {
            GameMap::default()
        } else {
            let data = load_map(source, map_id)?;
            GameMap::setup(map_id, data, &tables, switches)
        };
        Ok(Self { tables, map })
    }
}
