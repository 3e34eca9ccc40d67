//! Fixed-interval reconnection logic for ComfyUI WebSocket connections.
//!
//! ComfyUI is a required local dependency that is often still starting
//! when the bridge comes up, so connection attempts are retried at a
//! fixed interval forever. Only the [`CancellationToken`] stops them.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, ComfyUIConnection};

/// Tunable parameters for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay between a failed attempt (or a dropped connection) and the
    /// next attempt.
    pub interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Connect to ComfyUI, retrying at a fixed interval until it succeeds.
///
/// The first attempt is made immediately. Returns `Some(connection)` once
/// a connection succeeds, or `None` if `cancel` is triggered first.
pub async fn connect_with_retry(
    client: &ComfyUIClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<ComfyUIConnection> {
    let mut attempt = 0u64;

    loop {
        attempt += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(client_id = %client.client_id(), "Reconnect cancelled");
                return None;
            }
            result = client.connect() => {
                match result {
                    Ok(conn) => {
                        if attempt > 1 {
                            tracing::info!(attempt, "Reconnected to ComfyUI");
                        }
                        return Some(conn);
                    }
                    Err(e) => {
                        tracing::warn!(
                            attempt,
                            retry_in_ms = config.interval.as_millis() as u64,
                            error = %e,
                            "ComfyUI connection attempt failed",
                        );
                    }
                }
            }
        }

        if !sleep_or_cancel(config.interval, cancel).await {
            return None;
        }
    }
}

/// Sleep for `delay`. Returns `false` if `cancel` fired first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
