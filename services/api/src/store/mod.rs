//! Session Store
//!
//! Durable record of sessions and their ordered transcripts. Pure data access:
//! no conversation logic lives here.
//!
//! Contract shared by every backend:
//! - `create` seeds the session with a `system` marker, so a transcript never
//!   starts with anything else.
//! - Within one session, message timestamps are strictly increasing in
//!   insertion order and are the sole ordering key.
//! - A read that starts after an append completes observes that append.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{Message, MessageRole, Session};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use phishshield_core::Mode;
use uuid::Uuid;

/// Text of the marker message that opens every transcript.
pub const SESSION_STARTED_MARKER: &str = "New session started";

/// Builds a default visitor name such as `Visitor-1a2b3c`.
pub fn default_visitor_name() -> String {
    format!("Visitor-{}", &Uuid::new_v4().simple().to_string()[..6])
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates an `active` session and appends its `system` start marker.
    async fn create(&self, mode: Mode, full_name: Option<String>) -> Result<Session>;

    /// Looks up a session; `None` when it does not exist.
    async fn get(&self, id: Uuid) -> Result<Option<Session>>;

    /// Flips the session to `completed`. The stored completion time is never
    /// earlier than the creation time.
    async fn mark_completed(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Appends a message and returns it with its assigned timestamp.
    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Message>;

    /// Returns the transcript in ascending timestamp order, optionally
    /// restricted to `roles`.
    async fn list_messages(
        &self,
        session_id: Uuid,
        roles: Option<&[MessageRole]>,
    ) -> Result<Vec<Message>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_names_are_short_and_random() {
        let a = default_visitor_name();
        let b = default_visitor_name();
        assert!(a.starts_with("Visitor-"));
        assert_eq!(a.len(), "Visitor-".len() + 6);
        assert_ne!(a, b);
    }
}
