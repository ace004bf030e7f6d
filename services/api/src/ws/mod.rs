//! WebSocket Channels
//!
//! - `protocol`: the JSON event format exchanged with browsers.
//! - `session`: connection lifecycle for the chat and avatar channels.
//! - `relay`: turns one inbound chat message into outbound group events.

pub mod protocol;
mod relay;
pub mod session;

pub use session::{avatar_ws_handler, chat_ws_handler};
