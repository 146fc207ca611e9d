//! Enumerations used throughout the tickchorale client.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Voices
// ---------------------------------------------------------------------------

/// One of the two melodic parts, each bound to one market symbol.
///
/// On the wire the lead voice is `soprano` (driven by `qqq`) and the
/// secondary voice is `bass` (driven by `spy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Lead,
    Secondary,
}

impl Voice {
    pub const ALL: [Voice; 2] = [Voice::Lead, Voice::Secondary];

    /// Stable index for per-voice arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Lead => 0,
            Self::Secondary => 1,
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lead => write!(f, "lead"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rhythm / duration categories
// ---------------------------------------------------------------------------

/// Configured lead rhythm subdivision (`soprano_rhythm` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rhythm {
    Quarter,
    Eighth,
    #[default]
    Sixteenth,
}

impl Rhythm {
    /// Parse the wire value. Only 4, 8 and 16 are recognised.
    pub fn from_steps(steps: u8) -> Option<Self> {
        match steps {
            4 => Some(Self::Quarter),
            8 => Some(Self::Eighth),
            16 => Some(Self::Sixteenth),
            _ => None,
        }
    }

    pub fn steps(self) -> u8 {
        match self {
            Self::Quarter => 4,
            Self::Eighth => 8,
            Self::Sixteenth => 16,
        }
    }

    /// Duration category used when triggering a note at this rhythm.
    pub fn note_value(self) -> NoteValue {
        match self {
            Self::Quarter => NoteValue::Quarter,
            Self::Eighth => NoteValue::Eighth,
            Self::Sixteenth => NoteValue::Sixteenth,
        }
    }
}

impl TryFrom<u8> for Rhythm {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_steps(value).ok_or_else(|| format!("unsupported rhythm {value}"))
    }
}

impl From<Rhythm> for u8 {
    fn from(value: Rhythm) -> Self {
        value.steps()
    }
}

/// Duration category handed to the audio engine with each trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteValue {
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    /// Notation-style label (`"4n"`, `"8n"`, `"16n"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quarter => "4n",
            Self::Eighth => "8n",
            Self::Sixteenth => "16n",
        }
    }
}
