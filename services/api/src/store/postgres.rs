//! PostgreSQL adapter for the session store, built on `sqlx` connection pooling.

use super::{SESSION_STARTED_MARKER, SessionStore, default_visitor_name};
use crate::models::{Message, MessageRole, Session, SessionStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use phishshield_core::Mode;
use sqlx::PgPool;
use uuid::Uuid;

const SESSION_COLUMNS: &str =
    "id, session_name, full_name, mode, status, created_at, completed_at";

/// A wrapper around the `PgPool` implementing `SessionStore`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(&self, mode: Mode, full_name: Option<String>) -> Result<Session> {
        let id = Uuid::new_v4();
        let full_name = full_name.unwrap_or_else(default_visitor_name);
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions (id, session_name, full_name, mode) \
             VALUES ($1, $2, $3, $4) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .bind(Session::label(mode, id))
        .bind(full_name)
        .bind(mode.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) \
             VALUES ($1, $2, $3, clock_timestamp())",
        )
        .bind(session.id)
        .bind(MessageRole::System)
        .bind(SESSION_STARTED_MARKER)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn mark_completed(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET status = $2, completed_at = GREATEST($3, created_at) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(SessionStatus::Completed)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        // Appends to one session are serialized on its row, so the ordering
        // subquery below never races another writer.
        sqlx::query("SELECT id FROM sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| anyhow::anyhow!("session {} does not exist", session_id))?;

        // Timestamps must stay strictly increasing even when the clock does not.
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (session_id, role, content, created_at)
            VALUES (
                $1, $2, $3,
                GREATEST(
                    clock_timestamp(),
                    (SELECT MAX(created_at) + INTERVAL '1 microsecond'
                     FROM messages WHERE session_id = $1)
                )
            )
            RETURNING id, session_id, role, content, created_at
            "#,
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        roles: Option<&[MessageRole]>,
    ) -> Result<Vec<Message>> {
        let roles: Option<Vec<String>> =
            roles.map(|r| r.iter().map(|role| role.as_str().to_string()).collect());
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM messages
            WHERE session_id = $1
              AND ($2::text[] IS NULL OR role::text = ANY($2))
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .bind(roles)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }
}
