use std::path::Path;

use crate::config::DebugConfig;

/// Whether debug-only tooling (collision overlay, walk-through) is available this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugMode(pub bool);

impl DebugMode {
    /// An explicit setting wins; otherwise a marker file in `working_dir` turns debug mode on.
    pub fn detect(config: &DebugConfig, working_dir: &Path) -> Self {
        if let Some(enabled) = config.enabled {
            return Self(enabled);
        }
        let marker = working_dir.join(&config.marker_file);
        let enabled = marker.is_file();
        if enabled {
            tracing::info!(target: "field::debug", marker = %marker.display(), "debug mode enabled by marker file");
        }
        Self(enabled)
    }

    pub fn enabled(self) -> bool {
        self.0
    }
}
