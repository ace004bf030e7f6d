//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoints, rendered audio and the
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ChatPayload, ChatResponse, ConversationTurn, ErrorResponse, GestureAnimationResponse,
        HealthResponse, LipSyncPayload, LipSyncResponse, MedicalContext, MedicalContextPayload,
        Session, TranscriptionResponse, TtsPayload, TtsResponse, TurnRole,
    },
    state::AppState,
    ws::{avatar_ws_handler, chat_ws_handler},
};

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat,
        handlers::text_to_speech,
        handlers::transcribe,
        handlers::health,
        handlers::put_medical_context,
        handlers::get_history,
        handlers::get_gesture_animation,
        handlers::lip_sync,
    ),
    components(
        schemas(
            ChatPayload, ChatResponse, TtsPayload, TtsResponse, TranscriptionResponse,
            HealthResponse, MedicalContextPayload, MedicalContext, Session, ConversationTurn,
            TurnRole, GestureAnimationResponse, LipSyncPayload, LipSyncResponse, ErrorResponse
        )
    ),
    tags(
        (name = "AI Doctor API", description = "Chat fallback, session context and avatar helpers for the AI doctor")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let media = ServeDir::new(&app_state.config.audio_dir);
    let media_prefix = app_state.config.media_url_prefix.clone();

    let api_router = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/tts", post(handlers::text_to_speech))
        .route("/chat/transcribe", post(handlers::transcribe))
        .route("/chat/health", get(handlers::health))
        .route(
            "/sessions/{id}/medical-context",
            put(handlers::put_medical_context),
        )
        .route("/sessions/{id}/history", get(handlers::get_history))
        .route("/gestures/{name}", get(handlers::get_gesture_animation))
        .route("/animation/lip-sync", post(handlers::lip_sync))
        .route("/ws/chat/{session_id}", get(chat_ws_handler))
        .route("/ws/avatar/{session_id}", get(avatar_ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .nest_service(&media_prefix, media)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::ConversationStore,
        test_support::{FakeSpeech, ScriptedLlm, TestApp},
    };
    use approx::assert_relative_eq;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use doctor_core::gestures::{AnimationData, BoneRotation, GestureCategory, GestureDescriptor};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn call(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let res = create_router(app.state.clone()).oneshot(request).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_chat_defaults_session_and_falls_back() {
        let app = TestApp::builder().build();
        let (status, body) = call(
            &app,
            Method::POST,
            "/chat",
            Some(json!({"message": "I have a headache"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["session_id"], "default");
        assert_eq!(body["gesture"], "reassure");
        assert_eq!(body["mood"], "reassuring");
        assert_eq!(body["audio_url"], Value::Null);
        assert!(app.memory.recent_turns("default", 10).await.unwrap().len() == 2);
    }

    #[tokio::test]
    async fn test_chat_uses_provider_reply() {
        let app = TestApp::builder()
            .llm(ScriptedLlm::reply(
                "```json\n{\"response\":\"Please call emergency services.\",\"gesture\":\"examine\",\"mood\":\"concerned\",\"urgency\":\"high\"}\n```",
            ))
            .build();
        let (status, body) = call(
            &app,
            Method::POST,
            "/chat",
            Some(json!({"message": "crushing chest pain", "session_id": "abc"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Please call emergency services.");
        assert_eq!(body["urgency"], "high");
        assert_eq!(body["gesture"], "examine");
        assert_eq!(body["session_id"], "abc");
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let app = TestApp::builder().build();
        let (status, body) =
            call(&app, Method::POST, "/chat", Some(json!({"message": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_chat_survives_store_failure() {
        let app = TestApp::builder().failing_store().build();
        let (status, body) =
            call(&app, Method::POST, "/chat", Some(json!({"message": "hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gesture"], "welcome");
    }

    #[tokio::test]
    async fn test_tts_without_provider_defers_to_client() {
        let app = TestApp::builder().build();
        let (status, body) =
            call(&app, Method::POST, "/chat/tts", Some(json!({"text": "Rest well."}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": false, "audio_url": null}));
    }

    #[tokio::test]
    async fn test_tts_audio_is_served() {
        let app = TestApp::builder().speech(FakeSpeech::default()).build();
        let (_, body) =
            call(&app, Method::POST, "/chat/tts", Some(json!({"text": "Rest well."}))).await;
        let url = body["audio_url"].as_str().unwrap().to_string();
        assert!(url.starts_with("/media/audio/tts_"));

        let res = create_router(app.state.clone())
            .oneshot(Request::get(&url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Rest well.");
    }

    #[tokio::test]
    async fn test_transcribe_raw_body() {
        let app = TestApp::builder().speech(FakeSpeech::default()).build();
        let request = Request::post("/chat/transcribe?session_id=abc&file_name=clip.webm")
            .body(Body::from("my throat is sore"))
            .unwrap();
        let res = create_router(app.state.clone()).oneshot(request).await.unwrap();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"success": true, "transcription": "my throat is sore"}));
    }

    #[tokio::test]
    async fn test_health_reports_capabilities() {
        let app = TestApp::builder().llm(ScriptedLlm::reply("ok")).build();
        let (status, body) = call(&app, Method::GET, "/chat/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["openai_enabled"], true);
        assert_eq!(body["tts_enabled"], false);
    }

    #[tokio::test]
    async fn test_medical_context_round_trip_through_history() {
        let app = TestApp::builder().build();
        let (status, body) = call(
            &app,
            Method::PUT,
            "/sessions/abc/medical-context",
            Some(json!({"patient_age": 34, "allergies": "latex"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["allergies"], "latex");
        assert_eq!(body["symptoms"], "");

        call(
            &app,
            Method::POST,
            "/chat",
            Some(json!({"message": "I have a fever", "session_id": "abc"})),
        )
        .await;
        let (status, body) = call(&app, Method::GET, "/sessions/abc/history?limit=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let turns = body.as_array().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["role"], "ai");
    }

    #[tokio::test]
    async fn test_invalid_session_id_is_bad_request() {
        let app = TestApp::builder().build();
        let (status, _) = call(&app, Method::GET, "/sessions/a.b/history", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_gesture_lookup_prefers_library() {
        let app = TestApp::builder().build();
        for (name, bone) in [("nod", "neck"), ("shrug", "leftShoulder")] {
            app.memory
                .insert_gesture(GestureDescriptor {
                    name: name.into(),
                    category: GestureCategory::Emotional,
                    duration: 1.0,
                    trigger_keywords: vec![],
                    animation: AnimationData {
                        bone_rotations: vec![BoneRotation {
                            bone: bone.into(),
                            rotation: [0.0, 0.0, 20.0],
                            duration: 0.4,
                        }],
                    },
                })
                .await;
        }

        let (_, body) = call(&app, Method::GET, "/gestures/nod", None).await;
        assert_eq!(body["animation"]["bone_rotations"][0]["bone"], "neck");

        let (_, body) = call(&app, Method::GET, "/gestures/shrug", None).await;
        assert_eq!(body["animation"]["bone_rotations"][0]["bone"], "leftShoulder");
        assert_eq!(body["animation"]["bone_rotations"][0]["rotation"], json!([0.0, 0.0, 20.0]));

        let (_, body) = call(&app, Method::GET, "/gestures/wiggle", None).await;
        assert_eq!(body["animation"]["bone_rotations"], json!([]));
    }

    #[tokio::test]
    async fn test_gesture_lookup_falls_back_to_builtin() {
        let app = TestApp::builder().build();
        let (_, body) = call(&app, Method::GET, "/gestures/nod", None).await;
        assert_eq!(body["animation"]["bone_rotations"][0]["bone"], "head");
    }

    #[tokio::test]
    async fn test_lip_sync_frames() {
        let app = TestApp::builder().build();
        let (status, body) = call(
            &app,
            Method::POST,
            "/animation/lip-sync",
            Some(json!({"text": "hello world", "audio_duration": 2.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["frames"].as_array().unwrap().len(), 2);
        assert_relative_eq!(body["frames"][1]["time"].as_f64().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let app = TestApp::builder().build();
        let (status, body) = call(&app, Method::GET, "/api-docs/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/chat"].is_object());
    }
}
