//! Completion Gateway
//!
//! Wraps the chat-completion provider behind a contract that never fails:
//! every provider problem (disabled integration, local rate limit, network,
//! malformed output) resolves to the keyword-matched fallback reply.
//!
//! Two entry points exist. [`CompletionGateway::respond`] asks for a single
//! structured JSON answer. [`CompletionGateway::respond_streaming`] relays
//! prose fragments as they arrive and terminates with
//! [`CompletionEvent::Done`]. Gesture, mood and urgency are only part of the
//! structured answer, so a streamed reply always carries the defaults.

use crate::{
    fallback::fallback_reply,
    history::{ChatMessage, TokenCounter, assemble_messages, trim_conversation},
    llm_client::{CompletionFormat, LLMClient, LLMStreamEvent},
    prompt::{PatientContext, ReplyFormat, build_system_prompt},
    rate_limit::RateLimiter,
    vocabulary::{Gesture, Mood, Urgency},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

const STREAM_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("provider integration is disabled")]
    Disabled,
    #[error("local rate limit exceeded")]
    RateLimited,
    #[error("provider returned no content")]
    EmptyResponse,
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

/// Tunables for the gateway, built once from the service configuration.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub history_window: usize,
    pub requests_per_minute: usize,
    pub tokens_per_minute: usize,
    pub max_concurrent_requests: usize,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1000,
            history_window: 10,
            requests_per_minute: 60,
            tokens_per_minute: 10_000,
            max_concurrent_requests: 8,
        }
    }
}

/// The gateway's answer to one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalReply {
    pub text: String,
    pub gesture: Gesture,
    pub mood: Mood,
    pub urgency: Urgency,
    /// True when the reply came from the canned fallback table.
    pub fallback: bool,
}

impl MedicalReply {
    /// A provider reply without classification.
    pub fn unclassified(text: String) -> Self {
        Self {
            text,
            gesture: Gesture::Professional,
            mood: Mood::Professional,
            urgency: Urgency::Low,
            fallback: false,
        }
    }
}

/// One item of a streamed completion. `Done` is always the last item.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    Fragment(String),
    Done(MedicalReply),
}

pub type CompletionStream = ReceiverStream<CompletionEvent>;

#[derive(Deserialize)]
struct StructuredReply {
    response: Option<String>,
    gesture: Option<String>,
    mood: Option<String>,
    urgency: Option<String>,
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the provider's JSON answer, validating every vocabulary field.
///
/// Output that is not a JSON object is taken verbatim as the response text.
pub fn parse_medical_response(raw: &str) -> MedicalReply {
    match serde_json::from_str::<StructuredReply>(strip_code_fence(raw)) {
        Ok(parsed) => MedicalReply {
            text: parsed
                .response
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| raw.trim().to_string()),
            gesture: parsed
                .gesture
                .as_deref()
                .map(Gesture::from_lenient)
                .unwrap_or_default(),
            mood: parsed
                .mood
                .as_deref()
                .map(Mood::from_lenient)
                .unwrap_or_default(),
            urgency: parsed
                .urgency
                .as_deref()
                .map(Urgency::from_lenient)
                .unwrap_or_default(),
            fallback: false,
        },
        Err(e) => {
            warn!(error = %e, "Received non-JSON completion; using raw text");
            MedicalReply::unclassified(raw.trim().to_string())
        }
    }
}

pub struct CompletionGateway {
    client: Option<Arc<dyn LLMClient>>,
    settings: CompletionSettings,
    limiter: RateLimiter,
    tokens: TokenCounter,
    permits: Semaphore,
}

impl CompletionGateway {
    /// `client` is `None` when the provider integration is switched off.
    pub fn new(client: Option<Arc<dyn LLMClient>>, settings: CompletionSettings) -> Self {
        Self {
            limiter: RateLimiter::per_minute(
                settings.requests_per_minute,
                settings.tokens_per_minute,
            ),
            tokens: TokenCounter::for_model(&settings.model),
            permits: Semaphore::new(settings.max_concurrent_requests.max(1)),
            client,
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Single-shot completion. Never fails; see the module docs.
    pub async fn respond(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        patient: Option<&PatientContext>,
    ) -> MedicalReply {
        match self.try_respond(user_text, history, patient).await {
            Ok(reply) => {
                info!(
                    gesture = %reply.gesture,
                    mood = %reply.mood,
                    urgency = %reply.urgency,
                    query_len = user_text.len(),
                    "Generated medical response"
                );
                reply
            }
            Err(e) => {
                warn!(error = %e, "Completion unavailable; serving fallback response");
                fallback_reply(user_text)
            }
        }
    }

    /// Streamed completion. The returned stream yields every text fragment in
    /// provider order, then exactly one `Done` carrying the assembled reply.
    ///
    /// The provider call runs on its own task; dropping the stream stops
    /// fragment delivery but the call itself is left to finish.
    pub fn respond_streaming(
        self: &Arc<Self>,
        user_text: String,
        history: Vec<ChatMessage>,
        patient: Option<PatientContext>,
    ) -> CompletionStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            gateway
                .run_stream(&user_text, &history, patient.as_ref(), tx)
                .await
        });
        ReceiverStream::new(rx)
    }

    async fn run_stream(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        patient: Option<&PatientContext>,
        tx: mpsc::Sender<CompletionEvent>,
    ) {
        let reply = match self.stream_fragments(user_text, history, patient, &tx).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Streaming completion unavailable; serving fallback response");
                let reply = fallback_reply(user_text);
                if tx
                    .send(CompletionEvent::Fragment(reply.text.clone()))
                    .await
                    .is_err()
                {
                    return;
                }
                reply
            }
        };
        if tx.send(CompletionEvent::Done(reply)).await.is_err() {
            debug!("Stream consumer went away before completion");
        }
    }

    async fn try_respond(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        patient: Option<&PatientContext>,
    ) -> Result<MedicalReply, CompletionError> {
        let (client, messages) = self.admit(user_text, history, patient, ReplyFormat::Structured)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CompletionError::Provider(e.into()))?;

        let raw = client
            .complete(messages, CompletionFormat::JsonObject)
            .await?;
        if raw.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(parse_medical_response(&raw))
    }

    async fn stream_fragments(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        patient: Option<&PatientContext>,
        tx: &mpsc::Sender<CompletionEvent>,
    ) -> Result<MedicalReply, CompletionError> {
        let (client, messages) = self.admit(user_text, history, patient, ReplyFormat::Prose)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CompletionError::Provider(e.into()))?;

        let mut stream = client.stream(messages).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(LLMStreamEvent::TextChunk(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    text.push_str(&chunk);
                    if tx.send(CompletionEvent::Fragment(chunk)).await.is_err() {
                        debug!("Stream consumer went away; draining stopped");
                        break;
                    }
                }
                // Nothing reached the client yet, so the fallback can stand in.
                Err(e) if text.is_empty() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "Stream interrupted; finishing with partial response");
                    break;
                }
            }
        }

        if text.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        info!(response_len = text.len(), "Streamed medical response");
        Ok(MedicalReply::unclassified(text))
    }

    /// Builds the prompt and takes a rate-limit slot.
    fn admit(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        patient: Option<&PatientContext>,
        format: ReplyFormat,
    ) -> Result<(Arc<dyn LLMClient>, Vec<ChatMessage>), CompletionError> {
        let client = self.client.clone().ok_or(CompletionError::Disabled)?;

        let mut messages = assemble_messages(
            build_system_prompt(patient, format),
            history,
            self.settings.history_window,
            user_text,
        );
        let mut token_count = self.tokens.count_messages(&messages);
        let budget = self.settings.max_tokens as usize * 4 / 5;
        if token_count > budget {
            messages = trim_conversation(messages);
            let trimmed = self.tokens.count_messages(&messages);
            debug!(before = token_count, after = trimmed, "Trimmed conversation to fit token budget");
            token_count = trimmed;
        }

        if !self.limiter.try_acquire(token_count) {
            return Err(CompletionError::RateLimited);
        }
        Ok((client, messages))
    }
}
