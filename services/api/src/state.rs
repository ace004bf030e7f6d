//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the session store and provider gateways.

use crate::{
    config::Config,
    db::ConversationStore,
    hub::BroadcastHub,
    ws::protocol::{AvatarEvent, ServerEvent},
};
use doctor_core::{completion::CompletionGateway, gestures::GestureLibrary, speech::SpeechGateway};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub gestures: Arc<dyn GestureLibrary>,
    pub completion: Arc<CompletionGateway>,
    pub speech: Arc<SpeechGateway>,
    pub chat_hub: BroadcastHub<ServerEvent>,
    pub avatar_hub: BroadcastHub<AvatarEvent>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        gestures: Arc<dyn GestureLibrary>,
        completion: Arc<CompletionGateway>,
        speech: Arc<SpeechGateway>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            gestures,
            completion,
            speech,
            chat_hub: BroadcastHub::new(),
            avatar_hub: BroadcastHub::new(),
            config,
        }
    }
}

pub fn chat_group(session_id: &str) -> String {
    format!("chat_{session_id}")
}

pub fn avatar_group(session_id: &str) -> String {
    format!("avatar_{session_id}")
}
