//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for session
//! creation/lookup and audio transcription. It uses `utoipa` doc comments to
//! generate OpenAPI documentation.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use phishshield_core::{
    Mode,
    transcription::{AudioClip, SUPPORTED_AUDIO_EXTENSIONS, audio_extension, is_supported_extension},
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    models::{
        AudioFileInfo, CreateSessionPayload, ErrorResponse, SessionInfo, TranscribeUpload,
        TranscriptionResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Create a new chat or quiz session.
#[utoipa::path(
    post,
    path = "/api/session/create/",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionInfo),
        (status = 400, description = "Invalid JSON or mode", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload: CreateSessionPayload = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionPayload::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest("Invalid JSON".to_string()))?
    };

    let mode = match payload.mode.as_deref() {
        None => Mode::default(),
        Some(raw) => raw.parse::<Mode>().map_err(|_| {
            ApiError::BadRequest("Invalid mode. Must be \"chat\" or \"quiz\"".to_string())
        })?,
    };
    let full_name = payload.full_name.filter(|n| !n.trim().is_empty());

    let session = state.store.create(mode, full_name).await?;
    info!(session_id = %session.id, %mode, "Session created via REST");

    Ok((StatusCode::CREATED, Json(SessionInfo::from(session))))
}

/// Get a specific session by its ID.
#[utoipa::path(
    get,
    path = "/api/session/{id}/",
    responses(
        (status = 200, description = "Session details", body = SessionInfo),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    Ok(Json(SessionInfo::from(session)))
}

/// Transcribe an uploaded audio file to text.
#[utoipa::path(
    post,
    path = "/api/transcribe/",
    request_body(content = TranscribeUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Transcribed text", body = TranscriptionResponse),
        (status = 400, description = "Missing, empty, oversized or unsupported audio", body = ErrorResponse),
        (status = 500, description = "Transcription unavailable or failed", body = ErrorResponse)
    )
)]
pub async fn transcribe_audio(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("audio") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read audio upload: {e}")))?;
            upload = Some((file_name, bytes));
            break;
        }
    }
    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;

    let extension = validate_upload(file_name.as_deref(), bytes.len(), state.max_audio_bytes)?;

    let transcriber = state.transcriber.as_ref().ok_or_else(|| {
        ApiError::InternalServerError(anyhow::anyhow!("Transcription backend is not configured"))
    })?;

    let size = bytes.len();
    let text = transcriber
        .transcribe(AudioClip {
            bytes: bytes.to_vec(),
            extension: extension.clone(),
        })
        .await?;
    if text.is_empty() {
        return Err(ApiError::BadRequest(
            "No text could be transcribed from the audio file".to_string(),
        ));
    }

    Ok(Json(TranscriptionResponse {
        text,
        file_info: AudioFileInfo {
            original_name: file_name.unwrap_or_default(),
            size_mb: (size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            format: extension,
        },
    }))
}

/// Checks size and format of an upload and returns its extension.
fn validate_upload(file_name: Option<&str>, size: usize, max_bytes: usize) -> Result<String, ApiError> {
    if size > max_bytes {
        return Err(ApiError::BadRequest(format!(
            "File too large. Maximum size allowed: {:.1}MB",
            max_bytes as f64 / (1024.0 * 1024.0)
        )));
    }
    let extension = audio_extension(file_name);
    if !is_supported_extension(&extension) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file format: {}. Supported formats: {}",
            extension,
            SUPPORTED_AUDIO_EXTENSIONS.join(", ")
        )));
    }
    if size == 0 {
        return Err(ApiError::BadRequest("Uploaded audio file is empty".to_string()));
    }
    Ok(extension)
}
