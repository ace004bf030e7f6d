//! Defines the WebSocket message protocol between the browser client and the API server.

use doctor_core::{
    gestures::GestureCue,
    vocabulary::{Gesture, Mood, Urgency},
};
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) on the chat channel.
///
/// Unknown `type` values and unexpected fields are rejected.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClientEvent {
    /// Free text typed by the user.
    ChatMessage { message: String },
    /// Speech already transcribed by the browser.
    VoiceInput { transcription: String },
    /// A client-requested gesture, relayed to the group as-is.
    GestureTrigger { gesture: String },
}

/// Messages sent from the server to every subscriber of a chat group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A complete reply (single-shot mode, or the apology on failure).
    Message {
        message: String,
        gesture: Gesture,
        mood: Mood,
        urgency: Urgency,
        audio_url: Option<String>,
        gestures: Vec<GestureCue>,
    },
    StreamStart,
    /// A raw provider fragment for progressive display.
    StreamChunk { chunk: String },
    /// A word-aligned segment ready for speech synthesis.
    StreamTts { text: String },
    StreamEnd {
        complete_message: String,
        gesture: Gesture,
        mood: Mood,
    },
    GestureTrigger { gesture: String },
}

/// Messages fanned out on the avatar channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AvatarEvent {
    AvatarState { data: serde_json::Value },
}
