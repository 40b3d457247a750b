//! In-process session store for local development and tests.

use super::{SESSION_STARTED_MARKER, SessionStore, default_visitor_name};
use crate::models::{Message, MessageRole, Session, SessionStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use phishshield_core::Mode;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

struct SessionRecord {
    session: Session,
    messages: Vec<Message>,
}

impl SessionRecord {
    fn push(&mut self, id: i64, role: MessageRole, content: &str) -> Message {
        // Microsecond precision, as stored by Postgres and sent on the wire.
        let now = Utc::now().trunc_subsecs(6);
        let created_at = match self.messages.last() {
            Some(last) if last.created_at >= now => last.created_at + TimeDelta::microseconds(1),
            _ => now,
        };
        let message = Message {
            id,
            session_id: self.session.id,
            role,
            content: content.to_string(),
            created_at,
        };
        self.messages.push(message.clone());
        message
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, SessionRecord>,
    next_message_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_message_id += 1;
        self.next_message_id
    }
}

/// A `SessionStore` that keeps everything in memory behind a single lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, mode: Mode, full_name: Option<String>) -> Result<Session> {
        let id = Uuid::new_v4();
        let session = Session {
            id,
            session_name: Session::label(mode, id),
            full_name: full_name.unwrap_or_else(default_visitor_name),
            mode,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
        };

        let mut inner = self.inner.write().await;
        let message_id = inner.next_id();
        let mut record = SessionRecord {
            session: session.clone(),
            messages: Vec::new(),
        };
        record.push(message_id, MessageRole::System, SESSION_STARTED_MARKER);
        inner.sessions.insert(id, record);
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(&id).map(|r| r.session.clone()))
    }

    async fn mark_completed(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.sessions.get_mut(&id) {
            record.session.status = SessionStatus::Completed;
            record.session.completed_at = Some(at.max(record.session.created_at));
        }
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let record = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| anyhow::anyhow!("session {} does not exist", session_id))?;
        Ok(record.push(id, role, content))
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        roles: Option<&[MessageRole]>,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        let Some(record) = inner.sessions.get(&session_id) else {
            return Ok(Vec::new());
        };
        Ok(record
            .messages
            .iter()
            .filter(|m| roles.is_none_or(|roles| roles.contains(&m.role)))
            .cloned()
            .collect())
    }
}
