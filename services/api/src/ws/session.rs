//! Manages the WebSocket connection lifecycle and feeds frames to the state machine.

use super::{connection::Connection, protocol::ServerMessage};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

static NEXT_DISPATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Per-process connection number, recorded on the connection span to
/// correlate its log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DispatchId(u64);

impl DispatchId {
    fn next() -> Self {
        Self(NEXT_DISPATCH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Main handler for an individual WebSocket connection.
///
/// Frames are handled one at a time, so a new message is only read once the
/// previous turn has completed or failed. A client close, a transport error
/// or process shutdown all end the connection the same way.
#[instrument(name = "ws_connection", skip_all, fields(dispatch_id, session_id, mode))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let dispatch = DispatchId::next();
    tracing::Span::current().record("dispatch_id", dispatch.0);
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::channel::<ServerMessage>(32);
    let writer = tokio::spawn(forward_outbox(socket_tx, outbox_rx).in_current_span());

    let mut shutdown = state.shutdown.clone();
    let mut connection = Connection::new(state, outbox_tx);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                info!("Server shutting down. Closing connection.");
                break;
            }
            frame = socket_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => connection.on_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection.");
                    break;
                }
                Some(Ok(Message::Binary(_))) => debug!("Ignoring binary frame."),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    error!(error = ?e, "Error receiving from client WebSocket");
                    break;
                }
            },
        }
    }

    connection.disconnect().await;
    if let Err(e) = writer.await {
        error!(error = ?e, "Outbound writer task failed");
    }
    info!("WebSocket connection closed.");
}

/// Drains the connection's outbox into the socket until either side goes away.
async fn forward_outbox(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(msg) = outbox_rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            debug!(error = ?e, "Failed to write to client; stopping writer");
            break;
        }
    }
    let _ = socket_tx.close().await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
