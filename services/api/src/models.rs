//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use phishshield_core::Mode;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Bot,
}

/// Roles that make up the conversation seen by the generation backend.
pub const CONVERSATION_ROLES: [MessageRole; 2] = [MessageRole::User, MessageRole::Bot];

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct Session {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    /// Display label, e.g. `Quiz-<id>`.
    pub session_name: String,
    pub full_name: String,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String, example = "chat")]
    pub mode: Mode,
    #[schema(value_type = String, example = "active")]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn label(mode: Mode, id: Uuid) -> String {
        format!("{}-{}", mode.label_prefix(), id)
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of a session returned by the REST endpoints.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct SessionInfo {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub session_name: String,
    pub full_name: String,
    #[schema(value_type = String, example = "quiz")]
    pub mode: Mode,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<Session> for SessionInfo {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            session_name: session.session_name,
            full_name: session.full_name,
            mode: session.mode,
            status: session.status,
            start_time: session.created_at,
            end_time: session.completed_at,
        }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateSessionPayload {
    /// Either `chat` or `quiz`; defaults to `chat`.
    #[schema(example = "quiz")]
    pub mode: Option<String>,
    #[schema(example = "Visitor-1a2b3c")]
    pub full_name: Option<String>,
}

/// Multipart body of the transcription endpoint.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct TranscribeUpload {
    #[schema(value_type = String, format = Binary)]
    pub audio: Vec<u8>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct AudioFileInfo {
    pub original_name: String,
    pub size_mb: f64,
    pub format: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TranscriptionResponse {
    pub text: String,
    pub file_info: AudioFileInfo,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
