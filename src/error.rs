use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the field runtime.
///
/// `LookupMiss` and `InvalidTarget` are only produced for diagnostics; every public call site that
/// addresses another event recovers them locally as `false` or a no-op. The remaining variants halt
/// whatever operation produced them and are returned to the host.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("no event matches {target} on map {map_id}")]
    LookupMiss { map_id: u32, target: String },

    #[error("event {event_id} on map {map_id} has nothing to execute")]
    InvalidTarget { map_id: u32, event_id: u32 },

    #[error("failed to reload {table} from {}", path.display())]
    ReloadCorruption {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("event call depth {depth} exceeds the limit of {limit}")]
    RecursionOverflow { depth: u32, limit: u32 },

    #[error("script error in event {event_id}: {message}")]
    Script { event_id: u32, message: String },
}

impl FieldError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FieldError::LookupMiss { .. } | FieldError::InvalidTarget { .. })
    }
}
