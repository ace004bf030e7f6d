//! Process-local store used when no database is configured.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use doctor_core::gestures::{GestureDescriptor, GestureLibrary};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    db::ConversationStore,
    models::{ConversationTurn, MedicalContext, MedicalContextPayload, NewTurn, Session},
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    turns: HashMap<String, Vec<ConversationTurn>>,
    contexts: HashMap<String, MedicalContext>,
    gestures: HashMap<String, GestureDescriptor>,
}

/// Keeps every session in memory for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gesture library entry, replacing any with the same name.
    pub async fn insert_gesture(&self, gesture: GestureDescriptor) {
        self.inner
            .lock()
            .await
            .gestures
            .insert(gesture.name.clone(), gesture);
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_or_create_session(&self, id: &str) -> Result<Session> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let session = inner
            .sessions
            .entry(id.to_string())
            .and_modify(|s| s.updated_at = now)
            .or_insert_with(|| Session {
                id: id.to_string(),
                is_active: true,
                created_at: now,
                updated_at: now,
            });
        Ok(session.clone())
    }

    async fn add_turn(&self, turn: NewTurn) -> Result<ConversationTurn> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let saved = ConversationTurn {
            id: Uuid::new_v4(),
            session_id: turn.session_id.clone(),
            role: turn.role,
            content: turn.content,
            audio_url: turn.audio_url,
            metadata: turn.metadata,
            created_at: now,
        };
        if let Some(session) = inner.sessions.get_mut(&turn.session_id) {
            session.updated_at = now;
        }
        inner
            .turns
            .entry(turn.session_id)
            .or_default()
            .push(saved.clone());
        Ok(saved)
    }

    async fn recent_turns(&self, session_id: &str, limit: i64) -> Result<Vec<ConversationTurn>> {
        let inner = self.inner.lock().await;
        let turns = inner.turns.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(turns[turns.len().saturating_sub(limit)..].to_vec())
    }

    async fn medical_context(&self, session_id: &str) -> Result<Option<MedicalContext>> {
        Ok(self.inner.lock().await.contexts.get(session_id).cloned())
    }

    async fn upsert_medical_context(
        &self,
        session_id: &str,
        payload: MedicalContextPayload,
    ) -> Result<MedicalContext> {
        let context = MedicalContext {
            session_id: session_id.to_string(),
            patient_age: payload.patient_age,
            symptoms: payload.symptoms,
            medical_history: payload.medical_history,
            current_medications: payload.current_medications,
            allergies: payload.allergies,
            updated_at: Utc::now(),
        };
        self.inner
            .lock()
            .await
            .contexts
            .insert(session_id.to_string(), context.clone());
        Ok(context)
    }
}

#[async_trait]
impl GestureLibrary for InMemoryStore {
    async fn find_gesture(&self, name: &str) -> Result<Option<GestureDescriptor>> {
        Ok(self.inner.lock().await.gestures.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TurnRole;
    use doctor_core::{
        gestures::{AnimationData, GestureCategory},
        vocabulary::{Gesture, Mood, Urgency},
    };

    #[tokio::test]
    async fn test_session_is_created_once() {
        let store = InMemoryStore::new();
        let first = store.get_or_create_session("abc").await.unwrap();
        let second = store.get_or_create_session("abc").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.is_active);
    }

    #[tokio::test]
    async fn test_recent_turns_keep_order_and_limit() {
        let store = InMemoryStore::new();
        store.get_or_create_session("s").await.unwrap();
        for i in 0..4 {
            store
                .add_turn(NewTurn::user("s", &format!("q{i}")))
                .await
                .unwrap();
            store
                .add_turn(NewTurn::ai(
                    "s",
                    &format!("a{i}"),
                    Gesture::Nod,
                    Mood::Focused,
                    Urgency::Low,
                    None,
                ))
                .await
                .unwrap();
        }

        let turns = store.recent_turns("s", 3).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a2", "q3", "a3"]);
        assert_eq!(turns[0].role, TurnRole::Ai);

        assert!(store.recent_turns("other", 10).await.unwrap().is_empty());
        assert!(store.recent_turns("s", 0).await.unwrap().is_empty());
        assert_eq!(store.recent_turns("s", 100).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_medical_context_upsert_replaces() {
        let store = InMemoryStore::new();
        assert!(store.medical_context("s").await.unwrap().is_none());

        let payload = MedicalContextPayload {
            patient_age: Some(61),
            symptoms: "chest pain".into(),
            ..Default::default()
        };
        store.upsert_medical_context("s", payload).await.unwrap();
        let replaced = MedicalContextPayload {
            allergies: "aspirin".into(),
            ..Default::default()
        };
        store.upsert_medical_context("s", replaced).await.unwrap();

        let context = store.medical_context("s").await.unwrap().unwrap();
        assert_eq!(context.patient_age, None);
        assert_eq!(context.allergies, "aspirin");
        assert_eq!(context.symptoms, "");
    }

    #[tokio::test]
    async fn test_gesture_lookup() {
        let store = InMemoryStore::new();
        store
            .insert_gesture(GestureDescriptor {
                name: "bow".into(),
                category: GestureCategory::Professional,
                duration: 1.2,
                trigger_keywords: vec![],
                animation: AnimationData::default(),
            })
            .await;

        assert!(store.find_gesture("bow").await.unwrap().is_some());
        assert!(store.find_gesture("wave").await.unwrap().is_none());
    }
}
