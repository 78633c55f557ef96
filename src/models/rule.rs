use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Display mode of a window. Persisted as its integer code (0-3), which is
/// the on-disk contract shared with older rule files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowState {
    Hidden,
    #[default]
    Normal,
    Minimized,
    Maximized,
}

impl ShowState {
    pub fn code(self) -> u8 {
        match self {
            ShowState::Hidden => 0,
            ShowState::Normal => 1,
            ShowState::Minimized => 2,
            ShowState::Maximized => 3,
        }
    }

    /// Unknown codes decode as `Normal`; restoring a placement should never
    /// invent a mode the engine can't apply.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ShowState::Hidden,
            2 => ShowState::Minimized,
            3 => ShowState::Maximized,
            _ => ShowState::Normal,
        }
    }
}

impl Serialize for ShowState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ShowState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Ok(ShowState::from_code(code))
    }
}

/// A recorded window placement in logical pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Placement {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub show_state: ShowState,
}

/// One watched process and the placement last observed for its main window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub process_name: String,
    #[serde(default)]
    pub state: Option<Placement>,
}

impl Rule {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            state: None,
        }
    }
}
