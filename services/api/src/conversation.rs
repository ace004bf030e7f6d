//! One request/response turn, shared by the HTTP fallback and the realtime
//! channel.
//!
//! Persistence here is best-effort: store failures are logged and the reply
//! is still delivered.

use doctor_core::{
    completion::MedicalReply,
    gestures::{GestureCue, gestures_for},
    history::ChatMessage,
    prompt::PatientContext,
};
use tracing::{info, warn};

use crate::{models::NewTurn, state::AppState};

/// Stored history and patient context feeding one completion.
pub struct TurnContext {
    pub history: Vec<ChatMessage>,
    pub patient: Option<PatientContext>,
}

/// A single-shot reply with everything the client renders.
pub struct TurnOutcome {
    pub reply: MedicalReply,
    pub audio_url: Option<String>,
    pub gestures: Vec<GestureCue>,
}

/// Loads the history window and patient context for `session_id`.
pub async fn load_context(state: &AppState, session_id: &str) -> TurnContext {
    let limit = state.config.max_conversation_history as i64;
    let history = match state.store.recent_turns(session_id, limit).await {
        Ok(turns) => turns.iter().map(|t| t.to_chat_message()).collect(),
        Err(e) => {
            warn!(session_id, error = ?e, "Could not load conversation history");
            Vec::new()
        }
    };
    let patient = match state.store.medical_context(session_id).await {
        Ok(context) => context.map(|c| c.to_patient_context()),
        Err(e) => {
            warn!(session_id, error = ?e, "Could not load medical context");
            None
        }
    };
    TurnContext { history, patient }
}

pub async fn persist(state: &AppState, turn: NewTurn) {
    let session_id = turn.session_id.clone();
    let role = turn.role;
    if let Err(e) = state.store.add_turn(turn).await {
        warn!(session_id, %role, error = ?e, "Failed to persist conversation turn");
    }
}

/// Gesture timeline for a finished reply, empty when gestures are disabled.
fn timeline(state: &AppState, text: &str) -> Vec<GestureCue> {
    if state.config.features.gesture_responses {
        gestures_for(text)
    } else {
        Vec::new()
    }
}

/// Runs a full single-shot turn: persist the user text, complete, then map
/// gestures and synthesize speech, and persist the reply.
pub async fn respond_once(state: &AppState, session_id: &str, user_text: &str) -> TurnOutcome {
    let context = load_context(state, session_id).await;
    persist(state, NewTurn::user(session_id, user_text)).await;

    let reply = state
        .completion
        .respond(user_text, &context.history, context.patient.as_ref())
        .await;

    let gestures = timeline(state, &reply.text);
    let audio_url = state.speech.synthesize(&reply.text, None).await;

    persist(
        state,
        NewTurn::ai(
            session_id,
            &reply.text,
            reply.gesture,
            reply.mood,
            reply.urgency,
            audio_url.clone(),
        ),
    )
    .await;

    info!(
        session_id,
        gesture = %reply.gesture,
        fallback = reply.fallback,
        has_audio = audio_url.is_some(),
        "Completed chat turn"
    );
    TurnOutcome {
        reply,
        audio_url,
        gestures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::ConversationStore,
        models::TurnRole,
        test_support::{FakeSpeech, ScriptedLlm, TestApp},
    };
    use doctor_core::vocabulary::{Gesture, Mood};

    #[tokio::test]
    async fn test_turn_persists_both_sides() {
        let app = TestApp::builder()
            .llm(ScriptedLlm::reply(
                r#"{"response":"Hello! How can I help?","gesture":"welcome","mood":"professional","urgency":"low"}"#,
            ))
            .build();

        let outcome = respond_once(&app.state, "s1", "hi").await;
        assert_eq!(outcome.reply.gesture, Gesture::Welcome);
        assert_eq!(outcome.gestures[0].name, doctor_core::gestures::Cue::Wave);

        let turns = app.memory.recent_turns("s1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].role, TurnRole::Ai);
        assert_eq!(turns[1].metadata["gesture"], "welcome");
    }

    #[tokio::test]
    async fn test_history_excludes_current_message() {
        let llm = ScriptedLlm::reply(r#"{"response":"ok"}"#);
        let app = TestApp::builder().llm(llm.clone()).build();

        respond_once(&app.state, "s1", "first").await;
        respond_once(&app.state, "s1", "second").await;

        let prompts = llm.prompts();
        // system + "first" + "ok" + "second"
        assert_eq!(prompts[1].len(), 4);
        assert_eq!(prompts[1][3].content, "second");
        assert_eq!(prompts[1][1].content, "first");
    }

    #[tokio::test]
    async fn test_patient_context_reaches_prompt() {
        let llm = ScriptedLlm::reply(r#"{"response":"ok"}"#);
        let app = TestApp::builder().llm(llm.clone()).build();
        app.memory
            .upsert_medical_context(
                "s1",
                crate::models::MedicalContextPayload {
                    patient_age: Some(70),
                    allergies: "sulfa".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        respond_once(&app.state, "s1", "dizzy").await;
        assert!(llm.prompts()[0][0].content.contains("Age: 70; Allergies: sulfa"));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_reply() {
        let app = TestApp::builder().failing_store().build();
        let outcome = respond_once(&app.state, "s1", "I have a headache").await;
        assert!(outcome.reply.fallback);
        assert_eq!(outcome.reply.mood, Mood::Reassuring);
    }

    #[tokio::test]
    async fn test_audio_url_attached_when_tts_available() {
        let speech = FakeSpeech::default();
        let app = TestApp::builder().speech(speech.clone()).build();

        let outcome = respond_once(&app.state, "s1", "hello").await;
        assert!(outcome.audio_url.unwrap().starts_with("/media/audio/tts_"));
        assert_eq!(speech.synthesize_calls(), 1);
    }
}
