use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Key of a self switch. `event_id` is `None` when a name lookup failed; such keys are legal and
/// simply never match a real event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelfSwitchKey {
    pub map_id: u32,
    pub event_id: Option<u32>,
    pub switch: String,
}

impl SelfSwitchKey {
    pub fn new(map_id: u32, event_id: Option<u32>, switch: impl Into<String>) -> Self {
        Self { map_id, event_id, switch: switch.into() }
    }
}

/// Per-event boolean flags namespaced by map and event id. Outlives reloads and map transfers.
#[derive(Debug, Clone, Default)]
pub struct SelfSwitches {
    values: HashMap<SelfSwitchKey, bool>,
}

impl SelfSwitches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, map_id: u32, event_id: Option<u32>, switch: &str) -> bool {
        let key = SelfSwitchKey::new(map_id, event_id, switch);
        self.values.get(&key).copied().unwrap_or(false)
    }

    /// Returns the previous value.
    pub fn set(&mut self, map_id: u32, event_id: Option<u32>, switch: &str, value: bool) -> bool {
        let key = SelfSwitchKey::new(map_id, event_id, switch);
        self.values.insert(key, value).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SelfSwitchKey, bool)> {
        self.values.iter().map(|(key, value)| (key, *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_switches_read_false() {
        let switches = SelfSwitches::new();
        assert!(!switches.get(1, Some(2), "A"));
        assert!(!switches.get(1, None, "A"));
    }

    #[test]
    fn keys_are_scoped_by_map() {
        let mut switches = SelfSwitches::new();
        switches.set(1, Some(2), "A", true);
        assert!(switches.get(1, Some(2), "A"));
        assert!(!switches.get(3, Some(2), "A"));
        assert!(!switches.get(1, Some(2), "B"));
    }

    #[test]
    fn set_reports_previous_value() {
        let mut switches = SelfSwitches::new();
        assert!(!switches.set(1, Some(2), "C", true));
        assert!(switches.set(1, Some(2), "C", false));
        assert_eq!(switches.len(), 1);
    }
}
