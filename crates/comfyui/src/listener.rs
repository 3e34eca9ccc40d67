//! Long-lived ComfyUI event listener.
//!
//! Keeps one WebSocket subscription open for the lifetime of its
//! cancellation token: connect -> process messages -> wait -> reconnect.
//! Parsed messages are handed to a [`MessageHandler`], which is where
//! they get correlated with jobs.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::ComfyUIClient;
use crate::processor::{process_messages, MessageHandler};
use crate::reconnect::{connect_with_retry, sleep_or_cancel, ReconnectConfig};

/// Spawn [`run_listener`] as a background task.
pub fn spawn_listener(
    client: ComfyUIClient,
    handler: Arc<dyn MessageHandler>,
    config: ReconnectConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            client_id = %client.client_id(),
            ws_url = %client.ws_url(),
            "Starting ComfyUI event listener",
        );
        run_listener(&client, handler.as_ref(), &config, &cancel).await;
        tracing::info!("ComfyUI event listener exited");
    })
}

/// Core connection loop: connect -> process messages -> reconnect.
///
/// Runs until the cancellation token is triggered. Connection failures
/// and dropped connections are both retried after
/// [`ReconnectConfig::interval`].
pub async fn run_listener<H>(
    client: &ComfyUIClient,
    handler: &H,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) where
    H: MessageHandler + ?Sized,
{
    loop {
        let Some(conn) = connect_with_retry(client, config, cancel).await else {
            return;
        };

        let mut ws_stream = conn.ws_stream;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            handled = process_messages(&mut ws_stream, handler) => {
                tracing::info!(handled, "ComfyUI event stream ended");
            }
        }

        tracing::info!(
            retry_in_ms = config.interval.as_millis() as u64,
            "Connection lost, reconnecting",
        );
        if !sleep_or_cancel(config.interval, cancel).await {
            return;
        }
    }
}
