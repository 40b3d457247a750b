//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the session store and service clients.

use crate::store::SessionStore;
use phishshield_core::{
    generation::{GenerationGateway, ModelParams},
    policy::ModePolicy,
    transcription::Transcriber,
};
use std::sync::Arc;
use tokio::sync::watch;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub gateway: Arc<dyn GenerationGateway>,
    pub policy: Arc<ModePolicy>,
    pub model_params: ModelParams,
    /// `None` when no transcription backend is configured.
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub max_audio_bytes: usize,
    /// Flips to `true` when the process is shutting down.
    pub shutdown: watch::Receiver<bool>,
}
