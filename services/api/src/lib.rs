//! AI Doctor API Library Crate
//!
//! This library contains all the service logic for the AI doctor chat backend,
//! including the application state, persistence, API handlers, WebSocket
//! channels, and routing. The `api` binary is a thin wrapper around it.

pub mod config;
pub mod conversation;
pub mod db;
pub mod handlers;
pub mod hub;
pub mod memory_store;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;

#[cfg(test)]
mod test_support;
