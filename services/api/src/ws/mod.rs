//! WebSocket Session Management
//!
//! This module contains the live conversation protocol. It is structured into
//! submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `replay`: Rebuilds client replays and generation context from a stored transcript.
//! - `connection`: The per-connection state machine and receive pipeline.
//! - `session`: Drives a WebSocket through the state machine, from upgrade to close.

pub mod connection;
pub mod protocol;
pub mod replay;
pub mod session;

pub use session::ws_handler;
