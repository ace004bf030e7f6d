//! API and Database Models
//!
//! Data structures shared by `sqlx` row mapping, the HTTP surface and the
//! OpenAPI document generated with `utoipa`.

use chrono::{DateTime, Utc};
use doctor_core::{
    history::ChatMessage,
    lip_sync::LipSyncFrame,
    prompt::PatientContext,
    vocabulary::{Gesture, Mood, Urgency},
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Session id used by HTTP callers that do not send one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Session ids are opaque client-chosen keys: ASCII letters, digits and `-`.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "turn_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Ai,
    System,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Ai => write!(f, "ai"),
            TurnRole::System => write!(f, "system"),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Session {
    #[schema(example = "3f2b9c1e-consult")]
    pub id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct ConversationTurn {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub session_id: String,
    #[schema(value_type = String, example = "user")]
    pub role: TurnRole,
    pub content: String,
    pub audio_url: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// The provider-facing form of this turn.
    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            TurnRole::User => ChatMessage::user(self.content.clone()),
            TurnRole::Ai => ChatMessage::assistant(self.content.clone()),
            TurnRole::System => ChatMessage::system(self.content.clone()),
        }
    }
}

/// A turn about to be appended to a session transcript.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    pub audio_url: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewTurn {
    pub fn user(session_id: &str, content: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            role: TurnRole::User,
            content: content.to_string(),
            audio_url: None,
            metadata: serde_json::json!({}),
        }
    }

    /// An AI turn, recording the classification alongside the text.
    pub fn ai(
        session_id: &str,
        content: &str,
        gesture: Gesture,
        mood: Mood,
        urgency: Urgency,
        audio_url: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            role: TurnRole::Ai,
            content: content.to_string(),
            audio_url,
            metadata: serde_json::json!({
                "gesture": gesture,
                "mood": mood,
                "urgency": urgency,
            }),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct MedicalContext {
    pub session_id: String,
    pub patient_age: Option<i32>,
    pub symptoms: String,
    pub medical_history: String,
    pub current_medications: String,
    pub allergies: String,
    pub updated_at: DateTime<Utc>,
}

impl MedicalContext {
    pub fn to_patient_context(&self) -> PatientContext {
        let text = |s: &String| Some(s.clone()).filter(|s| !s.trim().is_empty());
        PatientContext {
            age: self.patient_age,
            symptoms: text(&self.symptoms),
            medical_history: text(&self.medical_history),
            medications: text(&self.current_medications),
            allergies: text(&self.allergies),
        }
    }
}

#[derive(Deserialize, ToSchema, Debug, Clone, Default)]
pub struct MedicalContextPayload {
    #[schema(example = 42)]
    pub patient_age: Option<i32>,
    #[serde(default)]
    #[schema(example = "Dry cough for two weeks")]
    pub symptoms: String,
    #[serde(default)]
    pub medical_history: String,
    #[serde(default)]
    pub current_medications: String,
    #[serde(default)]
    #[schema(example = "penicillin")]
    pub allergies: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct ChatPayload {
    #[schema(example = "I have a headache")]
    pub message: String,
    #[schema(example = "default")]
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    #[schema(value_type = String, example = "reassure")]
    pub gesture: Gesture,
    #[schema(value_type = String, example = "reassuring")]
    pub mood: Mood,
    #[schema(value_type = String, example = "low")]
    pub urgency: Urgency,
    pub audio_url: Option<String>,
    pub session_id: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct TtsPayload {
    #[schema(example = "Please rest and drink fluids.")]
    pub text: String,
    pub session_id: Option<String>,
    #[schema(example = "alloy")]
    pub voice: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TtsResponse {
    pub success: bool,
    pub audio_url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct TranscriptionQuery {
    pub session_id: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TranscriptionResponse {
    pub success: bool,
    pub transcription: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub service: String,
    pub websockets_available: bool,
    pub openai_enabled: bool,
    pub tts_enabled: bool,
    pub stt_enabled: bool,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct LipSyncPayload {
    pub text: String,
    /// Seconds of audio the frames should span.
    #[schema(example = 2.5)]
    pub audio_duration: f64,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct LipSyncResponse {
    #[schema(value_type = Vec<Object>)]
    pub frames: Vec<LipSyncFrame>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct GestureAnimationResponse {
    pub name: String,
    #[schema(value_type = Object)]
    pub animation: doctor_core::gestures::AnimationData,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_turn(role: TurnRole) -> ConversationTurn {
        ConversationTurn {
            id: Uuid::new_v4(),
            session_id: "abc-123".to_string(),
            role,
            content: "How long has it hurt?".to_string(),
            audio_url: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id("default"));
        assert!(is_valid_session_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../etc"));
        assert!(!is_valid_session_id("has space"));
        assert!(!is_valid_session_id(&"a".repeat(65)));
    }

    #[test]
    fn test_turn_role_wire_format() {
        assert_eq!(serde_json::to_string(&TurnRole::Ai).unwrap(), "\"ai\"");
        assert_eq!(format!("{}", TurnRole::System), "system");
        let role: TurnRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, TurnRole::User);
        assert!(serde_json::from_str::<TurnRole>("\"doctor\"").is_err());
    }

    #[test]
    fn test_turn_to_chat_message() {
        use doctor_core::history::ChatRole;
        assert_eq!(sample_turn(TurnRole::Ai).to_chat_message().role, ChatRole::Assistant);
        assert_eq!(sample_turn(TurnRole::User).to_chat_message().role, ChatRole::User);
    }

    #[test]
    fn test_ai_turn_records_classification() {
        let turn = NewTurn::ai(
            "s1",
            "Rest.",
            Gesture::CheckPulse,
            Mood::Concerned,
            Urgency::Medium,
            Some("/media/audio/tts_1.mp3".into()),
        );
        assert_eq!(turn.metadata["gesture"], "checkPulse");
        assert_eq!(turn.metadata["mood"], "concerned");
        assert_eq!(turn.metadata["urgency"], "medium");
    }

    #[test]
    fn test_medical_context_blank_fields_are_absent() {
        let context = MedicalContext {
            session_id: "s1".into(),
            patient_age: Some(30),
            symptoms: "fever".into(),
            medical_history: "".into(),
            current_medications: "  ".into(),
            allergies: "latex".into(),
            updated_at: Utc::now(),
        };
        let patient = context.to_patient_context();
        assert_eq!(patient.age, Some(30));
        assert_eq!(patient.symptoms.as_deref(), Some("fever"));
        assert_eq!(patient.medical_history, None);
        assert_eq!(patient.medications, None);
        assert_eq!(patient.allergies.as_deref(), Some("latex"));
    }

    #[test]
    fn test_chat_payload_session_is_optional() {
        let payload: ChatPayload = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(payload.session_id, None);
        assert!(serde_json::from_str::<ChatPayload>("{}").is_err());
    }

    #[test]
    fn test_chat_response_serialization() {
        let response = ChatResponse {
            success: true,
            message: "Rest.".into(),
            gesture: Gesture::CheckPulse,
            mood: Mood::Professional,
            urgency: Urgency::Low,
            audio_url: None,
            session_id: "default".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["gesture"], "checkPulse");
        assert_eq!(json["audio_url"], serde_json::Value::Null);
    }
}
