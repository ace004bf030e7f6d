//! Axum Handlers for the REST API
//!
//! HTTP fallback for clients without a realtime channel, plus session context
//! and avatar helper endpoints. `utoipa` annotations feed the OpenAPI document.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use doctor_core::{gestures::animation_for_name, lip_sync::lip_sync_frames};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    conversation::respond_once,
    models::{
        ChatPayload, ChatResponse, ConversationTurn, DEFAULT_SESSION_ID, ErrorResponse,
        GestureAnimationResponse, HealthResponse, HistoryQuery, LipSyncPayload, LipSyncResponse,
        MedicalContext, MedicalContextPayload, TranscriptionQuery, TranscriptionResponse,
        TtsPayload, TtsResponse, is_valid_session_id,
    },
    state::AppState,
};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
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

/// Resolves an optional client session id, defaulting to the shared one.
fn session_or_default(session_id: Option<String>) -> Result<String, ApiError> {
    match session_id.filter(|id| !id.is_empty()) {
        None => Ok(DEFAULT_SESSION_ID.to_string()),
        Some(id) if is_valid_session_id(&id) => Ok(id),
        Some(_) => Err(ApiError::BadRequest("Invalid session id".to_string())),
    }
}

fn require_session_id(id: &str) -> Result<(), ApiError> {
    if is_valid_session_id(id) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Invalid session id".to_string()))
    }
}

/// Answer one chat message without a realtime connection.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatPayload,
    responses(
        (status = 200, description = "Doctor reply", body = ChatResponse),
        (status = 400, description = "Empty message or invalid session id", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
    }
    let session_id = session_or_default(payload.session_id)?;

    if let Err(e) = state.store.get_or_create_session(&session_id).await {
        warn!(session_id, error = ?e, "Could not record session; continuing without persistence");
    }
    let outcome = respond_once(&state, &session_id, message).await;

    Ok(Json(ChatResponse {
        success: true,
        message: outcome.reply.text,
        gesture: outcome.reply.gesture,
        mood: outcome.reply.mood,
        urgency: outcome.reply.urgency,
        audio_url: outcome.audio_url,
        session_id,
    }))
}

/// Render text to speech. `audio_url` is null when server-side speech is
/// unavailable and the client should synthesize locally.
#[utoipa::path(
    post,
    path = "/chat/tts",
    request_body = TtsPayload,
    responses(
        (status = 200, description = "Rendered audio location", body = TtsResponse),
        (status = 400, description = "Empty text", body = ErrorResponse)
    )
)]
pub async fn text_to_speech(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TtsPayload>,
) -> Result<Json<TtsResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text cannot be empty".to_string()));
    }
    let session_id = session_or_default(payload.session_id)?;

    let audio_url = state
        .speech
        .synthesize(&payload.text, payload.voice.as_deref())
        .await;
    info!(session_id, has_audio = audio_url.is_some(), "Handled TTS request");
    Ok(Json(TtsResponse {
        success: audio_url.is_some(),
        audio_url,
    }))
}

/// Transcribe a raw audio body.
#[utoipa::path(
    post,
    path = "/chat/transcribe",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Transcript, or success=false for client-side recognition", body = TranscriptionResponse)
    ),
    params(
        ("session_id" = Option<String>, Query, description = "Session the audio belongs to"),
        ("file_name" = Option<String>, Query, description = "Original file name; its extension tells the provider the format")
    )
)]
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TranscriptionQuery>,
    body: Bytes,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let session_id = session_or_default(query.session_id)?;
    let file_name = query.file_name.unwrap_or_else(|| "audio.webm".to_string());

    let transcription = state.speech.transcribe(body.to_vec(), &file_name).await;
    info!(session_id, success = transcription.is_some(), "Handled transcription request");
    Ok(Json(TranscriptionResponse {
        success: transcription.is_some(),
        transcription,
    }))
}

/// Service liveness and which capabilities are live.
#[utoipa::path(
    get,
    path = "/chat/health",
    responses((status = 200, description = "Service status", body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "AI Doctor Chat".to_string(),
        websockets_available: true,
        openai_enabled: state.completion.is_enabled(),
        tts_enabled: state.speech.tts_available(),
        stt_enabled: state.speech.stt_available(),
    })
}

/// Store or replace the patient context used when prompting for a session.
#[utoipa::path(
    put,
    path = "/sessions/{id}/medical-context",
    request_body = MedicalContextPayload,
    responses(
        (status = 200, description = "Stored context", body = MedicalContext),
        (status = 400, description = "Invalid session id", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(("id" = String, Path, description = "Session ID"))
)]
pub async fn put_medical_context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<MedicalContextPayload>,
) -> Result<Json<MedicalContext>, ApiError> {
    require_session_id(&id)?;
    state.store.get_or_create_session(&id).await?;
    let context = state.store.upsert_medical_context(&id, payload).await?;
    Ok(Json(context))
}

/// Read back the most recent turns of a session, oldest first.
#[utoipa::path(
    get,
    path = "/sessions/{id}/history",
    responses(
        (status = 200, description = "Ordered conversation turns", body = [ConversationTurn]),
        (status = 400, description = "Invalid session id", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID"),
        ("limit" = Option<i64>, Query, description = "Maximum number of turns (default 50)")
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ConversationTurn>>, ApiError> {
    require_session_id(&id)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let turns = state.store.recent_turns(&id, limit).await?;
    Ok(Json(turns))
}

/// Resolve a gesture name to its skeletal animation.
#[utoipa::path(
    get,
    path = "/gestures/{name}",
    responses(
        (status = 200, description = "Animation descriptor, possibly empty", body = GestureAnimationResponse)
    ),
    params(("name" = String, Path, description = "Gesture name"))
)]
pub async fn get_gesture_animation(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<GestureAnimationResponse> {
    let animation = animation_for_name(state.gestures.as_ref(), &name).await;
    Json(GestureAnimationResponse { name, animation })
}

/// Coarse mouth-shape frames for avatar lip sync.
#[utoipa::path(
    post,
    path = "/animation/lip-sync",
    request_body = LipSyncPayload,
    responses(
        (status = 200, description = "Lip-sync frames", body = LipSyncResponse),
        (status = 400, description = "Invalid duration", body = ErrorResponse)
    )
)]
pub async fn lip_sync(Json(payload): Json<LipSyncPayload>) -> Result<Json<LipSyncResponse>, ApiError> {
    if !payload.audio_duration.is_finite() || payload.audio_duration < 0.0 {
        return Err(ApiError::BadRequest(
            "audio_duration must be a non-negative number".to_string(),
        ));
    }
    Ok(Json(LipSyncResponse {
        frames: lip_sync_frames(&payload.text, payload.audio_duration),
    }))
}
