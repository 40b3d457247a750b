//! Operating modes of a conversation.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The operating mode of a session, fixed when the session is created.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Open-ended phishing awareness conversation.
    #[default]
    Chat,
    /// Fixed-length, five question phishing quiz.
    Quiz,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown mode '{0}', expected \"chat\" or \"quiz\"")]
pub struct ModeParseError(pub String);

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Quiz => "quiz",
        }
    }

    /// Prefix used when building the display label of a session.
    pub fn label_prefix(&self) -> &'static str {
        match self {
            Mode::Chat => "Chat",
            Mode::Quiz => "Quiz",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Mode::Chat),
            "quiz" => Ok(Mode::Quiz),
            _ => Err(ModeParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = ModeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
