//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::models::Message;
use chrono::{DateTime, SecondsFormat, Utc};
use phishshield_core::Mode;
use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;
use uuid::Uuid;

/// Shown when a content message is empty or whitespace.
pub const EMPTY_CONTENT_NOTICE: &str = "Please enter a message.";
/// Shown for any failure inside a turn.
pub const TURN_FAILED_NOTICE: &str = "An error occurred. Please try again.";

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum FrameKind {
    Init,
    #[default]
    Message,
}

/// The raw JSON frame as sent by the client. Every field is optional.
#[derive(Deserialize, Debug, Default)]
struct ClientFrame {
    #[serde(rename = "type", default)]
    kind: FrameKind,
    session_id: Option<String>,
    mode: Option<String>,
    content: Option<String>,
}

/// Messages sent from the client (browser) to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Binds the connection to a resumed or new session.
    Init {
        /// Raw id of a session to resume; it may not parse or exist.
        session_id: Option<String>,
        /// Mode for a newly created session.
        mode: Mode,
    },
    /// A conversational turn from the user.
    Content { mode: Mode, content: String },
}

impl ClientMessage {
    /// Parses a text frame. `type` defaults to `message` and unknown modes fall back to `chat`.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let frame: ClientFrame = serde_json::from_str(text)?;
        let mode = match frame.mode.as_deref() {
            None => Mode::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Unknown mode requested, using chat");
                Mode::default()
            }),
        };
        Ok(match frame.kind {
            FrameKind::Init => ClientMessage::Init {
                session_id: frame.session_id.filter(|id| !id.trim().is_empty()),
                mode,
            },
            FrameKind::Message => ClientMessage::Content {
                mode,
                content: frame.content.unwrap_or_default(),
            },
        })
    }
}

fn iso_utc<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A historical user turn, replayed on resume.
    #[serde(rename = "message")]
    UserEcho {
        content: String,
        #[serde(serialize_with = "iso_utc")]
        timestamp: DateTime<Utc>,
    },
    /// A reply from the bot, live or replayed.
    BotResponse {
        content: String,
        #[serde(serialize_with = "iso_utc")]
        timestamp: DateTime<Utc>,
        session_id: Uuid,
        mode: Mode,
    },
    /// A transient notice that is never persisted.
    SystemMessage {
        content: String,
        #[serde(serialize_with = "iso_utc")]
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn bot_response(message: &Message, mode: Mode) -> Self {
        ServerMessage::BotResponse {
            content: message.content.clone(),
            timestamp: message.created_at,
            session_id: message.session_id,
            mode,
        }
    }

    pub fn notice(content: &str) -> Self {
        ServerMessage::SystemMessage {
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;
    use chrono::TimeZone;

    #[test]
    fn init_frame_parses() {
        let msg = ClientMessage::parse(
            r#"{"type":"init","session_id":"550e8400-e29b-41d4-a716-446655440000","mode":"quiz"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Init {
                session_id: Some("550e8400-e29b-41d4-a716-446655440000".to_string()),
                mode: Mode::Quiz,
            }
        );
    }

    #[test]
    fn type_defaults_to_message() {
        let msg = ClientMessage::parse(r#"{"content":"hello"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Content {
                mode: Mode::Chat,
                content: "hello".to_string()
            }
        );
    }

    #[test]
    fn missing_content_and_unknown_mode_are_tolerated() {
        let msg = ClientMessage::parse(r#"{"type":"message","mode":"trivia"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Content {
                mode: Mode::Chat,
                content: String::new()
            }
        );
        let msg = ClientMessage::parse(r#"{"type":"init","session_id":""}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Init {
                session_id: None,
                mode: Mode::Chat
            }
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"type":"voice"}"#).is_err());
    }

    #[test]
    fn bot_response_wire_format() {
        let message = Message {
            id: 7,
            session_id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            role: MessageRole::Bot,
            content: "**Question 1 of 5:**".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        };
        let json = serde_json::to_value(ServerMessage::bot_response(&message, Mode::Quiz)).unwrap();

        assert_eq!(json["type"], "bot_response");
        assert_eq!(json["content"], "**Question 1 of 5:**");
        assert_eq!(json["timestamp"], "2024-01-15T10:30:00.000000Z");
        assert_eq!(json["session_id"], "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(json["mode"], "quiz");
    }

    #[test]
    fn echo_and_notice_wire_format() {
        let echo = ServerMessage::UserEcho {
            content: "hi".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        };
        let json = serde_json::to_value(echo).unwrap();
        assert_eq!(json["type"], "message");
        assert!(json.get("session_id").is_none());

        let json = serde_json::to_value(ServerMessage::notice(EMPTY_CONTENT_NOTICE)).unwrap();
        assert_eq!(json["type"], "system_message");
        assert_eq!(json["content"], "Please enter a message.");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
