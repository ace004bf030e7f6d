//! Turns one inbound chat message into outbound events on the session group.

use crate::{
    config::ResponseMode,
    conversation::{load_context, persist, respond_once},
    models::NewTurn,
    state::{AppState, chat_group},
    ws::protocol::ServerEvent,
};
use anyhow::{Result, bail};
use doctor_core::{
    completion::CompletionEvent,
    vocabulary::{Gesture, Mood, Urgency},
};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

/// Per-request accumulation for a streamed reply.
#[derive(Debug, Default)]
pub struct StreamState {
    full_text: String,
    word_buffer: String,
    done: bool,
}

fn is_boundary(c: char) -> bool {
    c == ' ' || c == '.' || c == ','
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fragment. Returns the buffered text up to and including the
    /// last word boundary, if the buffer now contains one. Fragments arriving
    /// after [`finish`](Self::finish) are ignored.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if self.done {
            return None;
        }
        self.full_text.push_str(fragment);
        self.word_buffer.push_str(fragment);

        let cut = self.word_buffer.rfind(is_boundary)? + 1;
        let segment: String = self.word_buffer.drain(..cut).collect();
        Some(segment).filter(|s| !s.trim().is_empty())
    }

    /// Marks the stream complete and returns whatever is still buffered.
    pub fn finish(&mut self) -> Option<String> {
        self.done = true;
        let rest = std::mem::take(&mut self.word_buffer);
        Some(rest).filter(|s| !s.trim().is_empty())
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }
}

fn apology() -> ServerEvent {
    ServerEvent::Message {
        message: APOLOGY.to_string(),
        gesture: Gesture::Professional,
        mood: Mood::Professional,
        urgency: Urgency::Low,
        audio_url: None,
        gestures: Vec::new(),
    }
}

/// Processes one user message to completion.
///
/// The turn runs on its own task; if it fails or panics the group receives a
/// single apology `message` instead.
pub async fn handle_chat_message(state: &Arc<AppState>, session_id: &str, text: String) {
    let group = chat_group(session_id);
    let task = {
        let state = Arc::clone(state);
        let session_id = session_id.to_string();
        let group = group.clone();
        tokio::spawn(
            async move { run_turn(&state, &session_id, &group, &text).await }
                .instrument(info_span!("chat_turn")),
        )
    };

    let failure = match task.await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:?}"),
        Err(e) => e.to_string(),
    };
    error!(session_id, error = %failure, "Chat turn failed; sending apology");
    state.chat_hub.publish(&group, apology());
}

async fn run_turn(state: &AppState, session_id: &str, group: &str, text: &str) -> Result<()> {
    match state.config.response_mode {
        ResponseMode::Single => {
            let outcome = respond_once(state, session_id, text).await;
            state.chat_hub.publish(
                group,
                ServerEvent::Message {
                    message: outcome.reply.text,
                    gesture: outcome.reply.gesture,
                    mood: outcome.reply.mood,
                    urgency: outcome.reply.urgency,
                    audio_url: outcome.audio_url,
                    gestures: outcome.gestures,
                },
            );
            Ok(())
        }
        ResponseMode::Streaming => stream_turn(state, session_id, group, text).await,
    }
}

async fn stream_turn(state: &AppState, session_id: &str, group: &str, text: &str) -> Result<()> {
    let context = load_context(state, session_id).await;
    persist(state, NewTurn::user(session_id, text)).await;

    state.chat_hub.publish(group, ServerEvent::StreamStart);
    let mut events =
        state
            .completion
            .respond_streaming(text.to_string(), context.history, context.patient);

    let mut stream_state = StreamState::new();
    let mut final_reply = None;
    while let Some(event) = events.next().await {
        match event {
            CompletionEvent::Fragment(chunk) => {
                let segment = stream_state.push(&chunk);
                state
                    .chat_hub
                    .publish(group, ServerEvent::StreamChunk { chunk });
                if let Some(text) = segment {
                    state.chat_hub.publish(group, ServerEvent::StreamTts { text });
                }
            }
            CompletionEvent::Done(reply) => final_reply = Some(reply),
        }
    }
    let Some(reply) = final_reply else {
        bail!("completion stream ended without a final reply");
    };

    if let Some(text) = stream_state.finish() {
        state.chat_hub.publish(group, ServerEvent::StreamTts { text });
    }
    let complete_message = stream_state.full_text().to_string();
    state.chat_hub.publish(
        group,
        ServerEvent::StreamEnd {
            complete_message: complete_message.clone(),
            gesture: reply.gesture,
            mood: reply.mood,
        },
    );

    persist(
        state,
        NewTurn::ai(
            session_id,
            &complete_message,
            reply.gesture,
            reply.mood,
            reply.urgency,
            None,
        ),
    )
    .await;
    info!(session_id, fallback = reply.fallback, "Completed streamed chat turn");
    Ok(())
}
