//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoints, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AudioFileInfo, CreateSessionPayload, ErrorResponse, MessageRole, SessionInfo,
        SessionStatus, TranscribeUpload, TranscriptionResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Multipart framing allowance on top of the configured audio size.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::get_session,
        handlers::transcribe_audio,
    ),
    components(
        schemas(SessionInfo, CreateSessionPayload, ErrorResponse, SessionStatus, MessageRole, TranscribeUpload, TranscriptionResponse, AudioFileInfo)
    ),
    tags(
        (name = "PhishShield API", description = "Session management and transcription for the PhishShield awareness bot")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let upload_limit = app_state
        .max_audio_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let api_router = Router::new()
        .route("/api/session/create/", post(handlers::create_session))
        .route("/api/session/{id}/", get(handlers::get_session))
        .route(
            "/api/transcribe/",
            post(handlers::transcribe_audio).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/ws/chat/", get(ws_handler))
        .route("/ws/openai-chat/", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
