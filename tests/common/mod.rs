#![allow(dead_code)]

use kestrel_field::bitmap_cache::{BitmapLoader, NullBitmapLoader};
use kestrel_field::config::{FieldConfig, WatchMode};
use kestrel_field::data::{DataSource, FsDataSource};
use kestrel_field::debug::DebugMode;
use kestrel_field::input::{Input, InputButton};
use kestrel_field::overlay::backend::HeadlessBackend;
use kestrel_field::FieldRuntime;
use serde_json::{json, Value};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

/// A throwaway data directory holding every table plus whatever maps a test writes.
pub struct GameDir {
    dir: TempDir,
    stamp: u64,
}

impl GameDir {
    pub fn new() -> Self {
        let dir = tempdir().expect("temp data dir");
        let game = Self { dir, stamp: 0 };
        game.write_table("Actors", json!([{ "id": 1, "name": "Aluxes" }]));
        game.write_table("Items", json!([{ "id": 1, "name": "Potion" }]));
        game.write_table("Armors", json!([]));
        game.write_table("Animations", json!([]));
        game.write_table("Tilesets", json!([{ "id": 1, "name": "Field", "tileset_name": "field" }]));
        game.write_table("CommonEvents", json!([]));
        game
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_table(&self, label: &str, value: Value) {
        self.write_raw(&format!("{label}.json"), &value.to_string());
    }

    pub fn write_map(&self, map_id: u32, value: Value) {
        self.write_raw(&format!("Map{map_id:03}.json"), &value.to_string());
    }

    pub fn write_raw(&self, file: &str, contents: &str) {
        fs::write(self.root().join(file), contents).expect("write data file");
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.root().join(file)
    }

    /// Moves the marker table's modification time to a value it has never had.
    pub fn touch_marker(&mut self) {
        self.stamp += 1;
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + self.stamp * 10);
        let file = File::options().write(true).open(self.path("Actors.json")).expect("open marker");
        file.set_modified(time).expect("set marker mtime");
    }

    pub fn config(&self) -> FieldConfig {
        let mut config = FieldConfig::default();
        config.data.root = self.root().to_path_buf();
        config.reload.grace_ms = 0;
        config.reload.watch_mode = WatchMode::Poll;
        config
    }

    pub fn runtime(&self, debug: bool) -> FieldRuntime {
        self.runtime_with(self.config(), Box::new(FsDataSource::new(self.root())), debug)
    }

    pub fn runtime_with(&self, config: FieldConfig, source: Box<dyn DataSource>, debug: bool) -> FieldRuntime {
        self.runtime_with_loader(config, source, Box::new(NullBitmapLoader::default()), debug)
    }

    pub fn runtime_with_loader(
        &self,
        config: FieldConfig,
        source: Box<dyn DataSource>,
        loader: Box<dyn BitmapLoader>,
        debug: bool,
    ) -> FieldRuntime {
        FieldRuntime::new(config, source, loader, DebugMode(debug))
            .expect("start runtime")
            .with_default_plugins(HeadlessBackend::new())
            .expect("register plugins")
    }
}

pub fn map_json(width: u32, height: u32, events: Vec<Value>) -> Value {
    json!({
        "tileset_id": 1,
        "width": width,
        "height": height,
        "data": vec![0; (width * height * 3) as usize],
        "events": events,
    })
}

/// Single-page event running `list`.
pub fn event_json(id: u32, name: &str, x: i32, y: i32, list: Vec<Value>) -> Value {
    json!({ "id": id, "name": name, "x": x, "y": y, "pages": [{ "list": list }] })
}

pub fn script(line: &str) -> Value {
    json!({ "code": 355, "parameters": [line] })
}

pub fn wait(frames: i64) -> Value {
    json!({ "code": 106, "parameters": [frames] })
}

pub fn self_switch(switch: &str, on: bool) -> Value {
    json!({ "code": 123, "parameters": [switch, if on { 0 } else { 1 }] })
}

pub fn transfer(map_id: u32, x: i32, y: i32) -> Value {
    json!({ "code": 201, "parameters": [0, map_id, x, y, 0] })
}

pub fn end() -> Value {
    json!({ "code": 0, "parameters": [] })
}

pub fn idle() -> Input {
    Input::new()
}

pub fn pressed(button: InputButton) -> Input {
    let mut input = Input::new();
    input.set_button(button, true);
    input
}
