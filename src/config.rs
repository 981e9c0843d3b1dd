use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::data::TableKind;

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "DataConfig::default_root")]
    pub root: PathBuf,
    /// Table whose modification time signals that the editor saved.
    #[serde(default = "DataConfig::default_marker_table")]
    pub marker_table: String,
    #[serde(default = "DataConfig::default_start_map")]
    pub start_map: u32,
    #[serde(default)]
    pub start_x: i32,
    #[serde(default)]
    pub start_y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    #[default]
    Poll,
    Notify,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReloadConfig {
    #[serde(default = "ReloadConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "ReloadConfig::default_grace_ms")]
    pub grace_ms: u64,
    #[serde(default = "ReloadConfig::default_confirm_fingerprint")]
    pub confirm_fingerprint: bool,
    #[serde(default)]
    pub watch_mode: WatchMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterpreterConfig {
    #[serde(default = "InterpreterConfig::default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "InterpreterConfig::default_commands_per_tick")]
    pub commands_per_tick: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScreenConfig {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "OverlayConfig::default_tileset")]
    pub tileset: String,
    #[serde(default = "OverlayConfig::default_z")]
    pub z: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DebugConfig {
    /// Forces debug mode on or off. When unset the marker file decides.
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default = "DebugConfig::default_marker_file")]
    pub marker_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FieldConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Default)]
pub struct FieldConfigOverrides {
    pub data_root: Option<PathBuf>,
    pub grace_ms: Option<u64>,
    pub max_depth: Option<u32>,
    pub debug: Option<bool>,
}

impl DataConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("Data")
    }

    fn default_marker_table() -> String {
        TableKind::Actors.label().to_string()
    }

    const fn default_start_map() -> u32 {
        1
    }

    pub fn marker_kind(&self) -> TableKind {
        TableKind::from_label(&self.marker_table).unwrap_or_else(|| {
            tracing::warn!(
                target: "field::config",
                marker = %self.marker_table,
                "unknown marker table; watching Actors"
            );
            TableKind::Actors
        })
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            marker_table: Self::default_marker_table(),
            start_map: Self::default_start_map(),
            start_x: 0,
            start_y: 0,
        }
    }
}

impl ReloadConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_grace_ms() -> u64 {
        100
    }

    const fn default_confirm_fingerprint() -> bool {
        true
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            grace_ms: Self::default_grace_ms(),
            confirm_fingerprint: Self::default_confirm_fingerprint(),
            watch_mode: WatchMode::default(),
        }
    }
}

impl InterpreterConfig {
    const fn default_max_depth() -> u32 {
        100
    }

    const fn default_commands_per_tick() -> u32 {
        1_000
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self { max_depth: Self::default_max_depth(), commands_per_tick: Self::default_commands_per_tick() }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self { width: 640, height: 480 }
    }
}

impl OverlayConfig {
    fn default_tileset() -> String {
        "debug_collision".to_string()
    }

    const fn default_z() -> i32 {
        999
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self { tileset: Self::default_tileset(), z: Self::default_z() }
    }
}

impl DebugConfig {
    fn default_marker_file() -> PathBuf {
        PathBuf::from("debug_tester.dat")
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { enabled: None, marker_file: Self::default_marker_file() }
    }
}

impl FieldConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(target: "field::config", "config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &FieldConfigOverrides) {
        if let Some(root) = &overrides.data_root {
            self.data.root = root.clone();
        }
        if let Some(grace_ms) = overrides.grace_ms {
            self.reload.grace_ms = grace_ms;
        }
        if let Some(max_depth) = overrides.max_depth {
            self.interpreter.max_depth = max_depth;
        }
        if let Some(debug) = overrides.debug {
            self.debug.enabled = Some(debug);
        }
    }
}

impl FieldConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.data_root.is_none() && self.grace_ms.is_none() && self.max_depth.is_none() && self.debug.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.data_root.is_some() {
            fields.push("data");
        }
        if self.grace_ms.is_some() {
            fields.push("grace_ms");
        }
        if self.max_depth.is_some() {
            fields.push("max_depth");
        }
        if self.debug.is_some() {
            fields.push("debug");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg: FieldConfig = serde_json::from_str("{}").expect("parse empty config");
        assert_eq!(cfg.data.root, PathBuf::from("Data"));
        assert_eq!(cfg.data.marker_kind(), TableKind::Actors);
        assert_eq!(cfg.reload.grace(), Duration::from_millis(100));
        assert!(cfg.reload.confirm_fingerprint);
        assert_eq!(cfg.reload.watch_mode, WatchMode::Poll);
        assert_eq!(cfg.interpreter.max_depth, 100);
        assert_eq!(cfg.screen, ScreenConfig { width: 640, height: 480 });
        assert_eq!(cfg.overlay.tileset, "debug_collision");
        assert!(cfg.debug.enabled.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let mut file = NamedTempFile::new().expect("temp config");
        write!(file, r#"{{"reload":{{"grace_ms":5,"watch_mode":"notify"}},"data":{{"marker_table":"Items"}}}}"#)
            .expect("write config");
        let cfg = FieldConfig::load(file.path()).expect("load config");
        assert_eq!(cfg.reload.grace_ms, 5);
        assert_eq!(cfg.reload.watch_mode, WatchMode::Notify);
        assert!(cfg.reload.enabled);
        assert_eq!(cfg.data.marker_kind(), TableKind::Items);
        assert_eq!(cfg.data.start_map, 1);
    }

    #[test]
    fn overrides_apply_on_top_of_file_values() {
        let mut cfg = FieldConfig::default();
        let overrides = FieldConfigOverrides {
            data_root: Some(PathBuf::from("/tmp/game")),
            max_depth: Some(8),
            ..FieldConfigOverrides::default()
        };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.data.root, PathBuf::from("/tmp/game"));
        assert_eq!(cfg.interpreter.max_depth, 8);
        assert_eq!(cfg.reload.grace_ms, 100);
        assert_eq!(overrides.applied_fields(), vec!["data", "max_depth"]);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = FieldConfig::load_or_default("/definitely/not/here.json");
        assert_eq!(cfg.interpreter.commands_per_tick, 1_000);
    }
}
