//! Provider-facing domain logic for the virtual doctor service.
//!
//! Nothing in this crate knows about HTTP, WebSockets or the database. The
//! web service wires these gateways together and feeds them stored history.

pub mod completion;
pub mod fallback;
pub mod gestures;
pub mod history;
pub mod lip_sync;
pub mod llm_client;
pub mod prompt;
pub mod rate_limit;
pub mod speech;
pub mod vocabulary;
