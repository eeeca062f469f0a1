//! Tickbook Server - live dashboard over a folder of markdown notes.
//!
//! This crate provides the server half of Tickbook, responsible for:
//! - Serving the parsed house checklist and the todo dashboard over HTTP
//! - Toggling checkboxes in the underlying markdown files
//! - Watching the notes directory and pushing changes to WebSocket clients
//!
//! # Architecture
//!
//! Parsing, scanning and toggling live in `tickbook-core`. This crate owns
//! the state around them: the todo cache, the notification channel and the
//! debounced file watcher. Markdown files stay the only storage.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod routes;
pub mod watcher;
