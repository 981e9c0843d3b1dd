use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use super::TableKind;

/// Host-owned access to persisted game data.
pub trait DataSource {
    fn table_path(&self, table: TableKind) -> PathBuf;

    fn map_path(&self, map_id: u32) -> PathBuf;

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    fn modified(&self, path: &Path) -> Result<SystemTime>;

    /// Directory a filesystem watcher may observe, if the source lives on disk.
    fn watch_root(&self) -> Option<PathBuf> {
        None
    }
}

/// Data laid out as `<root>/Actors.json`, `<root>/Map001.json`, ...
#[derive(Debug, Clone)]
pub struct FsDataSource {
    root: PathBuf,
}

impl FsDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DataSource for FsDataSource {
    fn table_path(&self, table: TableKind) -> PathBuf {
        self.root.join(table.file_name())
    }

    fn map_path(&self, map_id: u32) -> PathBuf {
        self.root.join(format!("Map{map_id:03}.json"))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("read {}", path.display()))
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        let metadata = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        metadata.modified().with_context(|| format!("modification time of {}", path.display()))
    }

    fn watch_root(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_follow_table_and_map_naming() {
        let source = FsDataSource::new("Data");
        assert_eq!(source.table_path(TableKind::Tilesets), PathBuf::from("Data/Tilesets.json"));
        assert_eq!(source.map_path(7), PathBuf::from("Data/Map007.json"));
        assert_eq!(source.map_path(1234), PathBuf::from("Data/Map1234.json"));
    }

    #[test]
    fn missing_files_report_their_path() {
        let dir = tempdir().expect("temp dir");
        let source = FsDataSource::new(dir.path());
        let path = source.table_path(TableKind::Actors);
        let err = source.read_bytes(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Actors.json"));
        assert!(source.modified(&path).is_err());
    }
}
