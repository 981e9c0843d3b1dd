use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Logical buttons the field runtime reads. Hosts feed raw key names through `Input::push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputButton {
    Up,
    Down,
    Left,
    Right,
    Confirm,
    Cancel,
    DebugOverlay,
}

impl InputButton {
    pub const ALL: [InputButton; 7] = [
        InputButton::Up,
        InputButton::Down,
        InputButton::Left,
        InputButton::Right,
        InputButton::Confirm,
        InputButton::Cancel,
        InputButton::DebugOverlay,
    ];

    pub fn label(self) -> &'static str {
        match self {
            InputButton::Up => "up",
            InputButton::Down => "down",
            InputButton::Left => "left",
            InputButton::Right => "right",
            InputButton::Confirm => "confirm",
            InputButton::Cancel => "cancel",
            InputButton::DebugOverlay => "debug_overlay",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|button| button.label() == label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key { key: String, pressed: bool },
}

pub struct Input {
    bindings: InputBindings,
    held: HashSet<InputButton>,
    triggered: HashSet<InputButton>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        Self::with_bindings(InputBindings::load_or_default(path))
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self { bindings, held: HashSet::new(), triggered: HashSet::new() }
    }

    pub fn push(&mut self, event: InputEvent) {
        match event {
            InputEvent::Key { key, pressed } => {
                let buttons: Vec<InputButton> = self.bindings.buttons_for_key(&key).collect();
                for button in buttons {
                    self.set_button(button, pressed);
                }
            }
        }
    }

    /// Direct button control for hosts that poll their own devices.
    pub fn set_button(&mut self, button: InputButton, pressed: bool) {
        if pressed {
            if self.held.insert(button) {
                self.triggered.insert(button);
            }
        } else {
            self.held.remove(&button);
        }
    }

    pub fn press(&self, button: InputButton) -> bool {
        self.held.contains(&button)
    }

    /// True only on the frame the button went down.
    pub fn trigger(&self, button: InputButton) -> bool {
        self.triggered.contains(&button)
    }

    pub fn clear_frame(&mut self) {
        self.triggered.clear();
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_buttons: HashMap<String, Vec<InputButton>>,
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config),
                Err(err) => {
                    tracing::warn!(
                        target: "field::input",
                        "failed to parse {}: {err}. Falling back to default bindings.",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Buttons listed in the file replace their default keys; others keep the defaults.
    fn from_config(config: InputConfigFile) -> Self {
        let mut per_button: HashMap<InputButton, Vec<String>> = default_keys();
        for (name, keys) in config.bindings {
            let Some(button) = InputButton::from_label(&name) else {
                tracing::warn!(target: "field::input", "ignoring binding for unknown button '{name}'");
                continue;
            };
            per_button.insert(button, keys.into_iter().map(|key| key.to_ascii_lowercase()).collect());
        }
        Self::from_button_map(per_button)
    }

    fn from_button_map(per_button: HashMap<InputButton, Vec<String>>) -> Self {
        let mut key_to_buttons: HashMap<String, Vec<InputButton>> = HashMap::new();
        for button in InputButton::ALL {
            let Some(keys) = per_button.get(&button) else {
                continue;
            };
            for key in keys {
                key_to_buttons.entry(key.clone()).or_default().push(button);
            }
        }
        Self { key_to_buttons }
    }

    fn buttons_for_key<'a>(&'a self, key: &str) -> impl Iterator<Item = InputButton> + 'a {
        self.key_to_buttons.get(&key.to_ascii_lowercase()).into_iter().flat_map(|buttons| buttons.iter().copied())
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_button_map(default_keys())
    }
}

fn default_keys() -> HashMap<InputButton, Vec<String>> {
    let pairs: [(InputButton, &[&str]); 7] = [
        (InputButton::Up, &["up"]),
        (InputButton::Down, &["down"]),
        (InputButton::Left, &["left"]),
        (InputButton::Right, &["right"]),
        (InputButton::Confirm, &["enter", "space", "c"]),
        (InputButton::Cancel, &["escape", "x"]),
        (InputButton::DebugOverlay, &["w"]),
    ];
    pairs
        .into_iter()
        .map(|(button, keys)| (button, keys.iter().map(|key| key.to_string()).collect()))
        .collect()
}
