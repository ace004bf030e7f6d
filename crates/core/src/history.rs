//! Conversation history windowing and prompt-size control.

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Number of non-system messages kept when a prompt is over budget.
pub const TRIMMED_TAIL: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One provider-facing chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Assembles `[system, last N history turns, user]`.
///
/// System-role entries inside `history` are dropped; only the freshly built
/// system prompt leads the conversation.
pub fn assemble_messages(
    system_prompt: String,
    history: &[ChatMessage],
    max_history: usize,
    user_text: &str,
) -> Vec<ChatMessage> {
    let turns: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();
    let start = turns.len().saturating_sub(max_history);

    let mut messages = Vec::with_capacity(turns.len() - start + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(turns[start..].iter().map(|m| (*m).clone()));
    messages.push(ChatMessage::user(user_text));
    messages
}

/// Keeps the leading system message plus the last [`TRIMMED_TAIL`] messages.
pub fn trim_conversation(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut iter = messages.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let (system, rest): (Option<ChatMessage>, Vec<ChatMessage>) = if first.role == ChatRole::System
    {
        (Some(first), iter.collect())
    } else {
        (None, std::iter::once(first).chain(iter).collect())
    };

    let start = rest.len().saturating_sub(TRIMMED_TAIL);
    system
        .into_iter()
        .chain(rest.into_iter().skip(start))
        .collect()
}

/// Estimates prompt tokens the way the provider bills them.
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
}

impl TokenCounter {
    /// Picks the model's encoding, falling back to `cl100k_base`.
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .map_err(|e| warn!(error = %e, "No tokenizer available; using length heuristic"))
            .ok();
        Self { bpe }
    }

    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len().div_ceil(4),
        }
    }

    /// Content tokens plus 4 per message of framing and 2 for the reply primer.
    pub fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .map(|m| self.count(&m.content) + 4)
            .sum::<usize>()
            + 2
    }
}
