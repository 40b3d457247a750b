//! Connection State Machine
//!
//! Owns the protocol state of one physical connection:
//! `Open(unbound) -> Open(bound) -> Closed`. The transport (see `session`)
//! feeds it client messages one at a time and drains its outbox; turns are
//! therefore strictly sequential per connection.

use super::{
    protocol::{ClientMessage, EMPTY_CONTENT_NOTICE, ServerMessage, TURN_FAILED_NOTICE},
    replay,
};
use crate::{
    models::{CONVERSATION_ROLES, MessageRole},
    state::AppState,
};
use anyhow::anyhow;
use chrono::Utc;
use phishshield_core::{Mode, generation::GenerationRequest, policy::QUIZ_KICKOFF};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The session a connection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundSession {
    pub session_id: Uuid,
    pub mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Bound(BoundSession),
}

/// Failures inside the receive pipeline. Both are answered with the same
/// generic notice and leave the connection usable.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("session store failure: {0:#}")]
    Persistence(#[source] anyhow::Error),
    #[error("generation backend failure: {0:#}")]
    Gateway(#[source] anyhow::Error),
}

pub struct Connection {
    state: Arc<AppState>,
    outbox: mpsc::Sender<ServerMessage>,
    binding: Binding,
}

impl Connection {
    pub fn new(state: Arc<AppState>, outbox: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            state,
            outbox,
            binding: Binding::Unbound,
        }
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// Handles one raw text frame from the client.
    pub async fn on_text(&mut self, text: &str) {
        match ClientMessage::parse(text) {
            Ok(msg) => self.on_message(msg).await,
            Err(e) => {
                warn!(error = %e, "Malformed client frame");
                self.send(ServerMessage::notice(TURN_FAILED_NOTICE)).await;
            }
        }
    }

    /// The transition table.
    pub async fn on_message(&mut self, msg: ClientMessage) {
        match (self.binding, msg) {
            (Binding::Bound(bound), ClientMessage::Init { .. }) => {
                debug!(session_id = %bound.session_id, "Already bound; ignoring init");
            }
            (Binding::Unbound, ClientMessage::Init { session_id, mode }) => {
                self.establish(session_id.as_deref(), mode).await;
            }
            (_, ClientMessage::Content { content, .. }) if content.trim().is_empty() => {
                self.send(ServerMessage::notice(EMPTY_CONTENT_NOTICE)).await;
            }
            (Binding::Unbound, ClientMessage::Content { mode, content }) => {
                if let Some(bound) = self.establish(None, mode).await {
                    self.respond(bound, content.trim()).await;
                }
            }
            (Binding::Bound(bound), ClientMessage::Content { content, .. }) => {
                self.respond(bound, content.trim()).await;
            }
        }
    }

    /// Terminal transition. Marks the bound session completed; it stays resumable.
    pub async fn disconnect(self) {
        if let Binding::Bound(bound) = self.binding {
            match self
                .state
                .store
                .mark_completed(bound.session_id, Utc::now())
                .await
            {
                Ok(()) => info!(session_id = %bound.session_id, "Session marked completed"),
                Err(e) => {
                    error!(session_id = %bound.session_id, error = ?e, "Failed to mark session completed")
                }
            }
        }
    }

    /// Binds to the requested session, or to a new one when it cannot be resolved.
    async fn establish(&mut self, session_id: Option<&str>, mode: Mode) -> Option<BoundSession> {
        if let Some(session) = self.resolve(session_id).await {
            let bound = BoundSession {
                session_id: session.id,
                mode: session.mode,
            };
            self.bind(bound);
            info!(mode = %bound.mode, "Resumed existing session");
            self.replay(bound).await;
            return Some(bound);
        }

        let session = match self.state.store.create(mode, None).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = ?e, %mode, "Failed to create session");
                self.send(ServerMessage::notice(TURN_FAILED_NOTICE)).await;
                return None;
            }
        };
        let bound = BoundSession {
            session_id: session.id,
            mode: session.mode,
        };
        self.bind(bound);
        info!(mode = %bound.mode, "Created new session");

        if bound.mode == Mode::Quiz {
            self.respond(bound, QUIZ_KICKOFF).await;
        }
        Some(bound)
    }

    async fn resolve(&self, session_id: Option<&str>) -> Option<crate::models::Session> {
        let raw = session_id?;
        let id = match Uuid::parse_str(raw.trim()) {
            Ok(id) => id,
            Err(_) => {
                info!(session_id = raw, "Unparseable session id; starting a new session");
                return None;
            }
        };
        match self.state.store.get(id).await {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                info!(%id, "Session not found; starting a new session");
                None
            }
            Err(e) => {
                warn!(%id, error = ?e, "Session lookup failed; starting a new session");
                None
            }
        }
    }

    fn bind(&mut self, bound: BoundSession) {
        self.binding = Binding::Bound(bound);
        let span = tracing::Span::current();
        span.record("session_id", tracing::field::display(bound.session_id));
        span.record("mode", bound.mode.as_str());
    }

    async fn replay(&self, bound: BoundSession) {
        match self.state.store.list_messages(bound.session_id, None).await {
            Ok(transcript) => {
                for event in replay::client_replay(&transcript, bound.mode) {
                    self.send(event).await;
                }
            }
            Err(e) => {
                error!(error = ?e, "Failed to replay transcript");
                self.send(ServerMessage::notice(TURN_FAILED_NOTICE)).await;
            }
        }
    }

    /// Runs one turn, converting any failure into the generic notice.
    async fn respond(&self, bound: BoundSession, content: &str) {
        if let Err(e) = self.run_turn(bound, content).await {
            error!(session_id = %bound.session_id, error = %e, "Turn failed");
            self.send(ServerMessage::notice(TURN_FAILED_NOTICE)).await;
        }
    }

    /// persist user turn -> build context -> generate -> persist reply -> send.
    async fn run_turn(&self, bound: BoundSession, content: &str) -> Result<(), TurnError> {
        let store = &self.state.store;

        let user_message = store
            .append_message(bound.session_id, MessageRole::User, content)
            .await
            .map_err(TurnError::Persistence)?;

        let transcript = store
            .list_messages(bound.session_id, Some(&CONVERSATION_ROLES))
            .await
            .map_err(TurnError::Persistence)?;
        let context = replay::generation_context(&transcript, &user_message);

        let request = GenerationRequest {
            instructions: self.state.policy.turn_instructions(bound.mode, &context),
            context,
            params: self.state.model_params.clone(),
        };
        let reply = self
            .state
            .gateway
            .complete(request)
            .await
            .map_err(TurnError::Gateway)?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(TurnError::Gateway(anyhow!("empty completion")));
        }

        let bot_message = store
            .append_message(bound.session_id, MessageRole::Bot, reply)
            .await
            .map_err(TurnError::Persistence)?;

        self.send(ServerMessage::bot_response(&bot_message, bound.mode))
            .await;
        Ok(())
    }

    async fn send(&self, msg: ServerMessage) {
        if self.outbox.send(msg).await.is_err() {
            debug!("Client writer is gone; dropping outbound message");
        }
    }
}
