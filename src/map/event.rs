use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::self_switches::SelfSwitches;

/// Instruction codes understood by the interpreter.
pub mod opcode {
    pub const END: i32 = 0;
    pub const WAIT: i32 = 106;
    pub const COMMENT: i32 = 108;
    pub const EXIT_EVENT: i32 = 115;
    pub const CALL_COMMON_EVENT: i32 = 117;
    pub const CONTROL_SELF_SWITCH: i32 = 123;
    pub const TRANSFER_PLAYER: i32 = 201;
    pub const SCRIPT: i32 = 355;
    pub const COMMENT_CONTINUED: i32 = 408;
    pub const SCRIPT_CONTINUED: i32 = 655;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub code: i32,
    #[serde(default)]
    pub indent: i32,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl Instruction {
    pub fn new(code: i32, parameters: Vec<Value>) -> Self {
        Self { code, indent: 0, parameters }
    }

    pub fn end() -> Self {
        Self::new(opcode::END, Vec::new())
    }

    /// Comments and terminators never do anything when executed.
    pub fn is_structural(&self) -> bool {
        matches!(self.code, opcode::END | opcode::COMMENT | opcode::COMMENT_CONTINUED)
    }

    pub fn int_param(&self, index: usize) -> Option<i64> {
        self.parameters.get(index).and_then(Value::as_i64)
    }

    pub fn str_param(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_switch: Option<String>,
}

impl PageCondition {
    fn is_met(&self, map_id: u32, event_id: u32, switches: &SelfSwitches) -> bool {
        match &self.self_switch {
            Some(switch) => switches.get(map_id, Some(event_id), switch),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventGraphic {
    #[serde(default)]
    pub tile_id: u16,
    #[serde(default)]
    pub character_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub condition: PageCondition,
    #[serde(default)]
    pub graphic: EventGraphic,
    #[serde(default)]
    pub through: bool,
    #[serde(default)]
    pub list: Vec<Instruction>,
}

/// On-disk shape of a map event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub pages: Vec<EventPage>,
}

/// A map-resident scripted entity.
#[derive(Debug, Clone)]
pub struct MapEvent {
    pub id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub erased: bool,
    pub through: bool,
    pub tile_id: u16,
    pub character_name: String,
    pages: Vec<EventPage>,
    page: Option<usize>,
}

impl MapEvent {
    pub fn from_data(data: EventData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            x: data.x,
            y: data.y,
            erased: false,
            through: true,
            tile_id: 0,
            character_name: String::new(),
            pages: data.pages,
            page: None,
        }
    }

    /// Single-page event, handy for building maps in code.
    pub fn with_list(id: u32, name: impl Into<String>, list: Vec<Instruction>) -> Self {
        let data = EventData {
            id,
            name: name.into(),
            x: 0,
            y: 0,
            pages: vec![EventPage { list, ..EventPage::default() }],
        };
        let mut event = Self::from_data(data);
        event.select_page(Some(0));
        event
    }

    pub fn page_index(&self) -> Option<usize> {
        self.page
    }

    pub fn pages(&self) -> &[EventPage] {
        &self.pages
    }

    /// Instruction list of the active page; `None` when no page condition holds.
    pub fn list(&self) -> Option<&[Instruction]> {
        self.page.and_then(|idx| self.pages.get(idx)).map(|page| page.list.as_slice())
    }

    /// True when the event is present, not erased, and has at least one instruction that does
    /// something.
    pub fn is_executable(&self) -> bool {
        if self.erased {
            return false;
        }
        match self.list() {
            Some(list) => list.iter().any(|instruction| !instruction.is_structural()),
            None => false,
        }
    }

    pub fn erase(&mut self) {
        self.erased = true;
        self.select_page(None);
    }

    /// Re-evaluates page conditions. The last page whose condition holds wins.
    pub fn refresh(&mut self, map_id: u32, switches: &SelfSwitches) {
        let next = if self.erased {
            None
        } else {
            self.pages.iter().rposition(|page| page.condition.is_met(map_id, self.id, switches))
        };
        if next != self.page {
            self.select_page(next);
        }
    }

    fn select_page(&mut self, page: Option<usize>) {
        self.page = page;
        match page.and_then(|idx| self.pages.get(idx)) {
            Some(active) => {
                self.through = active.through;
                self.tile_id = active.graphic.tile_id;
                self.character_name = active.graphic.character_name.clone();
            }
            None => {
                self.through = true;
                self.tile_id = 0;
                self.character_name.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn say(text: &str) -> Instruction {
        Instruction::new(opcode::SCRIPT, vec![json!(text)])
    }

    fn comment(text: &str) -> Instruction {
        Instruction::new(opcode::COMMENT, vec![json!(text)])
    }

    #[test]
    fn erased_events_are_not_executable() {
        let mut event = MapEvent::with_list(1, "Chest", vec![say("x"), Instruction::end()]);
        assert!(event.is_executable());
        event.erase();
        assert!(!event.is_executable());
    }

    #[test]
    fn empty_and_comment_only_lists_are_not_executable() {
        let empty = MapEvent::with_list(1, "Empty", Vec::new());
        assert!(!empty.is_executable());

        let comments = MapEvent::with_list(
            2,
            "Notes",
            vec![
                comment("todo"),
                Instruction::new(opcode::COMMENT_CONTINUED, vec![json!("more")]),
                Instruction::end(),
            ],
        );
        assert!(!comments.is_executable());
    }

    #[test]
    fn event_without_active_page_is_not_executable() {
        let data = EventData {
            id: 3,
            name: "Gate".into(),
            x: 0,
            y: 0,
            pages: vec![EventPage {
                condition: PageCondition { self_switch: Some("A".into()) },
                list: vec![say("open"), Instruction::end()],
                ..EventPage::default()
            }],
        };
        let mut event = MapEvent::from_data(data);
        let switches = SelfSwitches::default();
        event.refresh(1, &switches);
        assert!(event.list().is_none());
        assert!(!event.is_executable());
    }

    #[test]
    fn refresh_picks_last_satisfied_page() {
        let data = EventData {
            id: 5,
            name: "Door".into(),
            x: 2,
            y: 3,
            pages: vec![
                EventPage {
                    graphic: EventGraphic { tile_id: 0, character_name: "door_closed".into() },
                    through: false,
                    list: vec![say("closed"), Instruction::end()],
                    ..EventPage::default()
                },
                EventPage {
                    condition: PageCondition { self_switch: Some("A".into()) },
                    through: true,
                    list: vec![say("open"), Instruction::end()],
                    ..EventPage::default()
                },
            ],
        };
        let mut event = MapEvent::from_data(data);
        let mut switches = SelfSwitches::default();
        event.refresh(7, &switches);
        assert_eq!(event.page_index(), Some(0));
        assert_eq!(event.character_name, "door_closed");
        assert!(!event.through);

        switches.set(7, Some(5), "A", true);
        event.refresh(7, &switches);
        assert_eq!(event.page_index(), Some(1));
        assert!(event.through);
        assert!(event.character_name.is_empty());
    }
}
