//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, WebSocket connection management,
//! the prompt submission API, and the reconnecting event listener used
//! by the job orchestrator.

pub mod api;
pub mod client;
pub mod listener;
pub mod messages;
pub mod processor;
pub mod reconnect;
