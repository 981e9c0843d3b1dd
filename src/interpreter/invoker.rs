//! Cross-event addressing: calling another event's script inline and poking at other events'
//! self switches. Every lookup failure is silent; only exceeding the depth bound is an error.

use std::fmt;

use crate::error::FieldError;
use crate::events::{EventBus, FieldEvent};
use crate::map::event::MapEvent;
use crate::map::self_switches::SelfSwitches;
use crate::map::GameMap;

use super::{Interpreter, InterpreterContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget<'a> {
    Id(u32),
    Name(&'a str),
}

impl<'a> EventTarget<'a> {
    pub fn resolve<'m>(&self, map: &'m GameMap) -> Option<&'m MapEvent> {
        match *self {
            EventTarget::Id(id) => map.event_by_id(id),
            EventTarget::Name(name) => map.event_by_name(name).map(|(_, event)| event),
        }
    }
}

impl fmt::Display for EventTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTarget::Id(id) => write!(f, "id {id}"),
            EventTarget::Name(name) => write!(f, "name '{name}'"),
        }
    }
}

pub fn can_call(map: &GameMap, target: EventTarget<'_>) -> bool {
    target.resolve(map).is_some_and(MapEvent::is_executable)
}

/// Builds the child context for a call made from `caller_depth`. `Ok(None)` when the target is
/// missing or has nothing to run.
pub fn prepare_call(
    map: &GameMap,
    target: EventTarget<'_>,
    caller_depth: u32,
    max_depth: u32,
) -> Result<Option<InterpreterContext>, FieldError> {
    let Some(event) = target.resolve(map) else {
        let miss = FieldError::LookupMiss { map_id: map.map_id(), target: target.to_string() };
        tracing::debug!(target: "field::interpreter", "call skipped: {miss}");
        return Ok(None);
    };
    if !event.is_executable() {
        let invalid = FieldError::InvalidTarget { map_id: map.map_id(), event_id: event.id };
        tracing::debug!(target: "field::interpreter", "call skipped: {invalid}");
        return Ok(None);
    }
    let depth = caller_depth + 1;
    if depth > max_depth {
        return Err(FieldError::RecursionOverflow { depth, limit: max_depth });
    }
    Ok(InterpreterContext::for_event(depth, map.map_id(), event))
}

pub fn get_self_switch(map: &GameMap, switches: &SelfSwitches, other_name: &str, switch: &str) -> bool {
    let event_id = map.event_by_name(other_name).map(|(id, _)| id);
    switches.get(map.map_id(), event_id, switch)
}

/// Writes the switch and flags the map for refresh. An unknown name writes the key with no event
/// id, which no event ever reads. Returns the resolved event id.
pub fn set_self_switch(
    map: &mut GameMap,
    switches: &mut SelfSwitches,
    other_name: &str,
    switch: &str,
    value: bool,
) -> Option<u32> {
    let event_id = map.event_by_name(other_name).map(|(id, _)| id);
    switches.set(map.map_id(), event_id, switch, value);
    map.need_refresh = true;
    event_id
}

/// Host-side handle exposing the script API over borrowed runtime state.
pub struct EventInvoker<'a> {
    pub(crate) interpreter: &'a mut Interpreter,
    pub(crate) map: &'a mut GameMap,
    pub(crate) self_switches: &'a mut SelfSwitches,
    pub(crate) events: &'a mut EventBus,
}

impl<'a> EventInvoker<'a> {
    pub fn new(
        interpreter: &'a mut Interpreter,
        map: &'a mut GameMap,
        self_switches: &'a mut SelfSwitches,
        events: &'a mut EventBus,
    ) -> Self {
        Self { interpreter, map, self_switches, events }
    }

    pub fn call_event(&mut self, name: &str) -> Result<bool, FieldError> {
        self.interpreter.call(self.map, EventTarget::Name(name))
    }

    pub fn call_event_by_id(&mut self, id: u32) -> Result<bool, FieldError> {
        self.interpreter.call(self.map, EventTarget::Id(id))
    }

    pub fn can_call_event(&self, name: &str) -> bool {
        can_call(self.map, EventTarget::Name(name))
    }

    pub fn can_call_event_by_id(&self, id: u32) -> bool {
        can_call(self.map, EventTarget::Id(id))
    }

    pub fn get_others_self_switch(&self, name: &str, switch: &str) -> bool {
        get_self_switch(self.map, self.self_switches, name, switch)
    }

    pub fn set_others_self_switch(&mut self, name: &str, switch: &str, value: bool) {
        let event_id = set_self_switch(self.map, self.self_switches, name, switch, value);
        self.events.push(FieldEvent::SelfSwitchChanged {
            map_id: self.map.map_id(),
            event_id,
            switch: switch.to_string(),
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Tileset;
    use crate::map::event::{opcode, Instruction};
    use serde_json::json;

    fn runnable(id: u32, name: &str) -> MapEvent {
        MapEvent::with_list(id, name, vec![Instruction::new(opcode::WAIT, vec![json!(1)]), Instruction::end()])
    }

    fn map_with(events: Vec<MapEvent>) -> GameMap {
        let mut map = GameMap::new(4, 10, 10, Tileset::default());
        for event in events {
            map.insert_event(event);
        }
        map
    }

    #[test]
    fn can_call_checks_presence_and_validity() {
        let mut erased = runnable(2, "Ghost");
        erased.erase();
        let map = map_with(vec![runnable(1, "Door"), erased, MapEvent::with_list(3, "Blank", vec![])]);
        assert!(can_call(&map, EventTarget::Name("Door")));
        assert!(can_call(&map, EventTarget::Id(1)));
        assert!(!can_call(&map, EventTarget::Name("Ghost")));
        assert!(!can_call(&map, EventTarget::Id(3)));
        assert!(!can_call(&map, EventTarget::Name("Nobody")));
        assert!(!can_call(&map, EventTarget::Id(99)));
    }

    #[test]
    fn prepare_call_binds_child_one_level_down() {
        let map = map_with(vec![runnable(7, "Lever")]);
        let child = prepare_call(&map, EventTarget::Id(7), 2, 100).expect("no overflow").expect("child");
        assert_eq!(child.depth(), 3);
        assert_eq!(child.event_id(), 7);
        assert_eq!(child.list(), map.event_by_id(7).and_then(MapEvent::list).expect("list"));
    }

    #[test]
    fn prepare_call_reports_overflow_only_for_real_targets() {
        let map = map_with(vec![runnable(7, "Lever")]);
        let err = prepare_call(&map, EventTarget::Id(7), 100, 100).unwrap_err();
        assert!(matches!(err, FieldError::RecursionOverflow { depth: 101, limit: 100 }));
        assert!(prepare_call(&map, EventTarget::Id(8), 100, 100).expect("miss is silent").is_none());
    }

    #[test]
    fn self_switches_are_scoped_to_current_map() {
        let mut map = map_with(vec![runnable(5, "Door")]);
        let mut switches = SelfSwitches::new();
        let resolved = set_self_switch(&mut map, &mut switches, "Door", "A", true);
        assert_eq!(resolved, Some(5));
        assert!(map.need_refresh);
        assert!(get_self_switch(&map, &switches, "Door", "A"));
        assert!(switches.get(4, Some(5), "A"));
        assert!(!switches.get(9, Some(5), "A"), "other maps keep their own switch");
    }

    #[test]
    fn unknown_names_write_a_detached_key() {
        let mut map = map_with(vec![runnable(5, "Door")]);
        let mut switches = SelfSwitches::new();
        assert_eq!(set_self_switch(&mut map, &mut switches, "Nobody", "B", true), None);
        assert!(switches.get(4, None, "B"));
        assert!(get_self_switch(&map, &switches, "Nobody", "B"));
        assert!(!get_self_switch(&map, &switches, "Door", "B"));
    }
}
