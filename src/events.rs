use std::fmt;

/// Notifications the runtime raises for the host. Drained once per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    ReloadCommitted { map_id: u32 },
    ReloadRejected { reason: String },
    OverlayShown { map_id: u32, blocked_tiles: usize },
    OverlayHidden,
    MapTransferred { from: u32, to: u32, x: i32, y: i32 },
    SelfSwitchChanged { map_id: u32, event_id: Option<u32>, switch: String, value: bool },
    ScriptLog { event_id: u32, message: String },
}

impl fmt::Display for FieldEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldEvent::ReloadCommitted { map_id } => write!(f, "ReloadCommitted map={map_id}"),
            FieldEvent::ReloadRejected { reason } => write!(f, "ReloadRejected {reason}"),
            FieldEvent::OverlayShown { map_id, blocked_tiles } => {
                write!(f, "OverlayShown map={map_id} blocked={blocked_tiles}")
            }
            FieldEvent::OverlayHidden => write!(f, "OverlayHidden"),
            FieldEvent::MapTransferred { from, to, x, y } => {
                write!(f, "MapTransferred from={from} to={to} at=({x},{y})")
            }
            FieldEvent::SelfSwitchChanged { map_id, event_id, switch, value } => match event_id {
                Some(id) => write!(f, "SelfSwitchChanged map={map_id} event={id} switch={switch} value={value}"),
                None => write!(f, "SelfSwitchChanged map={map_id} event=? switch={switch} value={value}"),
            },
            FieldEvent::ScriptLog { event_id, message } => write!(f, "ScriptLog event={event_id} {message}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<FieldEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: FieldEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = FieldEvent>) {
        self.events.extend(events);
    }

    pub fn drain(&mut self) -> Vec<FieldEvent> {
        self.events.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
