//! Data Access Layer
//!
//! The `ConversationStore` trait is the Session Store seam used by handlers
//! and the WebSocket relay. `Db` implements it over PostgreSQL with `sqlx`;
//! `memory_store::InMemoryStore` implements it for database-less runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use doctor_core::gestures::{AnimationData, GestureDescriptor, GestureLibrary};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::models::{
    ConversationTurn, MedicalContext, MedicalContextPayload, NewTurn, Session,
};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the session with `id`, creating it on first contact.
    async fn get_or_create_session(&self, id: &str) -> Result<Session>;

    /// Appends a turn to a session transcript.
    async fn add_turn(&self, turn: NewTurn) -> Result<ConversationTurn>;

    /// The most recent `limit` turns, oldest first.
    async fn recent_turns(&self, session_id: &str, limit: i64) -> Result<Vec<ConversationTurn>>;

    async fn medical_context(&self, session_id: &str) -> Result<Option<MedicalContext>>;

    async fn upsert_medical_context(
        &self,
        session_id: &str,
        payload: MedicalContextPayload,
    ) -> Result<MedicalContext>;
}

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

#[derive(FromRow)]
struct GestureRow {
    name: String,
    category: String,
    animation_data: Json<AnimationData>,
    duration: f64,
    trigger_keywords: Json<Vec<String>>,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for Db {
    async fn get_or_create_session(&self, id: &str) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id)
            VALUES ($1)
            ON CONFLICT (id) DO UPDATE SET updated_at = now()
            RETURNING id, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn add_turn(&self, turn: NewTurn) -> Result<ConversationTurn> {
        let mut tx = self.pool.begin().await?;

        let saved = sqlx::query_as::<_, ConversationTurn>(
            r#"
            INSERT INTO conversation_turns (id, session_id, role, content, audio_url, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, session_id, role, content, audio_url, metadata, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&turn.session_id)
        .bind(turn.role)
        .bind(&turn.content)
        .bind(&turn.audio_url)
        .bind(&turn.metadata)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE sessions SET updated_at = now() WHERE id = $1")
            .bind(&turn.session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn recent_turns(&self, session_id: &str, limit: i64) -> Result<Vec<ConversationTurn>> {
        let mut turns = sqlx::query_as::<_, ConversationTurn>(
            r#"
            SELECT id, session_id, role, content, audio_url, metadata, created_at
            FROM conversation_turns
            WHERE session_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        turns.reverse();
        Ok(turns)
    }

    async fn medical_context(&self, session_id: &str) -> Result<Option<MedicalContext>> {
        let context = sqlx::query_as::<_, MedicalContext>(
            r#"
            SELECT session_id, patient_age, symptoms, medical_history,
                   current_medications, allergies, updated_at
            FROM medical_contexts
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(context)
    }

    async fn upsert_medical_context(
        &self,
        session_id: &str,
        payload: MedicalContextPayload,
    ) -> Result<MedicalContext> {
        let context = sqlx::query_as::<_, MedicalContext>(
            r#"
            INSERT INTO medical_contexts
                (session_id, patient_age, symptoms, medical_history, current_medications, allergies)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id) DO UPDATE SET
                patient_age = EXCLUDED.patient_age,
                symptoms = EXCLUDED.symptoms,
                medical_history = EXCLUDED.medical_history,
                current_medications = EXCLUDED.current_medications,
                allergies = EXCLUDED.allergies,
                updated_at = now()
            RETURNING session_id, patient_age, symptoms, medical_history,
                      current_medications, allergies, updated_at
            "#,
        )
        .bind(session_id)
        .bind(payload.patient_age)
        .bind(&payload.symptoms)
        .bind(&payload.medical_history)
        .bind(&payload.current_medications)
        .bind(&payload.allergies)
        .fetch_one(&self.pool)
        .await?;
        Ok(context)
    }
}

#[async_trait]
impl GestureLibrary for Db {
    async fn find_gesture(&self, name: &str) -> Result<Option<GestureDescriptor>> {
        let row = sqlx::query_as::<_, GestureRow>(
            r#"
            SELECT name, category, animation_data, duration, trigger_keywords
            FROM gesture_library
            WHERE name = $1 AND is_active
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(GestureDescriptor {
                category: row
                    .category
                    .parse()
                    .with_context(|| format!("gesture '{}'", row.name))?,
                name: row.name,
                duration: row.duration,
                trigger_keywords: row.trigger_keywords.0,
                animation: row.animation_data.0,
            })
        })
        .transpose()
    }
}
