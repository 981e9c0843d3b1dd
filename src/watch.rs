use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use crate::config::WatchMode;
use crate::data::DataSource;

/// Filesystem watcher over the data directory. Only answers "did anything happen since the last
/// call"; the reload watcher still compares modification times itself.
pub struct DataDirWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    root: PathBuf,
}

impl DataDirWatcher {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            anyhow::bail!("data directory '{}' does not exist", root.display());
        }
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .configure(
                NotifyConfig::default()
                    .with_compare_contents(false)
                    .with_poll_interval(Duration::from_millis(300)),
            )
            .context("configure data watcher")?;
        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", root.display()))?;
        Ok(Self { _watcher: watcher, rx, root: root.to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drains pending notifications. True when at least one could have changed file contents.
    pub fn take_dirty(&mut self) -> bool {
        let mut dirty = false;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(event) => dirty |= is_relevant(&event.kind),
                Err(err) => {
                    tracing::warn!(target: "field::reload", "data watcher error: {err}");
                    // A lost event must not hide a change.
                    dirty = true;
                }
            }
        }
        dirty
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Metadata(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
            | EventKind::Remove(_)
    )
}

/// Decides each tick whether the marker file needs a stat.
pub enum ChangeProbe {
    Poll,
    Notify(DataDirWatcher),
}

impl ChangeProbe {
    /// Falls back to polling when the source has no directory or the watcher cannot start.
    pub fn for_mode(mode: WatchMode, source: &dyn DataSource) -> Self {
        match mode {
            WatchMode::Poll => ChangeProbe::Poll,
            WatchMode::Notify => {
                let Some(root) = source.watch_root() else {
                    tracing::warn!(target: "field::reload", "data source has no directory to watch; polling");
                    return ChangeProbe::Poll;
                };
                match DataDirWatcher::new(&root) {
                    Ok(watcher) => {
                        tracing::info!(target: "field::reload", root = %root.display(), "watching data directory");
                        ChangeProbe::Notify(watcher)
                    }
                    Err(err) => {
                        tracing::warn!(target: "field::reload", "notify watcher unavailable ({err:#}); polling");
                        ChangeProbe::Poll
                    }
                }
            }
        }
    }

    pub fn is_notify(&self) -> bool {
        matches!(self, ChangeProbe::Notify(_))
    }

    pub fn should_stat(&mut self) -> bool {
        match self {
            ChangeProbe::Poll => true,
            ChangeProbe::Notify(watcher) => watcher.take_dirty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FsDataSource;
    use tempfile::tempdir;

    #[test]
    fn poll_always_stats() {
        let dir = tempdir().expect("temp dir");
        let mut probe = ChangeProbe::for_mode(WatchMode::Poll, &FsDataSource::new(dir.path()));
        assert!(!probe.is_notify());
        assert!(probe.should_stat());
        assert!(probe.should_stat());
    }

    #[test]
    fn missing_directory_falls_back_to_poll() {
        let dir = tempdir().expect("temp dir");
        let source = FsDataSource::new(dir.path().join("absent"));
        let probe = ChangeProbe::for_mode(WatchMode::Notify, &source);
        assert!(!probe.is_notify());
    }

    #[test]
    fn relevant_kinds_cover_writes_and_renames() {
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_relevant(&EventKind::Create(notify::event::CreateKind::File)));
        assert!(!is_relevant(&EventKind::Access(notify::event::AccessKind::Any)));
    }
}
