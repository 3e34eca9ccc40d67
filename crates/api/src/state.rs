use std::sync::Arc;

use tapnow_worker::orchestrator::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job orchestrator (registry, worker loop, ComfyUI listener).
    pub orchestrator: Arc<Orchestrator>,
}
