//! WebSocket message processing loop.
//!
//! Reads raw frames from a ComfyUI WebSocket connection, parses them
//! into typed [`ComfyUIMessage`] variants and hands each one to a
//! [`MessageHandler`]. A frame that fails to parse is logged and
//! dropped; it never ends the loop.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::messages::{is_known_type, message_type, parse_message, ComfyUIMessage};

/// Receiver of parsed ComfyUI messages.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: ComfyUIMessage);
}

/// Process WebSocket messages from a ComfyUI connection.
///
/// Loops until the WebSocket closes, encounters a receive error, or the
/// stream is exhausted. Binary frames (preview images) are ignored.
/// Returns the number of messages handed to `handler`.
pub async fn process_messages<S, H>(ws_stream: &mut S, handler: &H) -> u64
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    H: MessageHandler + ?Sized,
{
    let mut handled = 0u64;

    while let Some(msg_result) = ws_stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if handle_text_message(&text, handler).await {
                    handled += 1;
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!("Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "ComfyUI WebSocket closed");
                break;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    handled
}

/// Parse a single text frame and dispatch it. Returns whether the frame
/// reached the handler.
async fn handle_text_message<H>(text: &str, handler: &H) -> bool
where
    H: MessageHandler + ?Sized,
{
    match parse_message(text) {
        Ok(msg) => {
            log_message(&msg);
            handler.handle(msg).await;
            true
        }
        Err(e) => {
            match message_type(text) {
                Some(kind) if !is_known_type(&kind) => {
                    tracing::trace!(kind = %kind, "Ignoring unrecognised ComfyUI message");
                }
                _ => {
                    tracing::warn!(
                        error = %e,
                        raw_message = %text,
                        "Failed to parse ComfyUI message",
                    );
                }
            }
            false
        }
    }
}

fn log_message(msg: &ComfyUIMessage) {
    match msg {
        ComfyUIMessage::Status(data) => {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
        }
        ComfyUIMessage::ExecutionStart(data) => {
            tracing::info!(prompt_id = %data.prompt_id, "Execution started");
        }
        ComfyUIMessage::ExecutionCached(data) => {
            tracing::debug!(
                prompt_id = %data.prompt_id,
                cached_nodes = data.nodes.len(),
                "Execution used cache",
            );
        }
        ComfyUIMessage::Executing(data) => match data.node {
            Some(ref node) => {
                tracing::debug!(prompt_id = %data.prompt_id, node = %node, "Executing node");
            }
            None => {
                tracing::info!(prompt_id = %data.prompt_id, "Execution completed (all nodes done)");
            }
        },
        ComfyUIMessage::Progress(data) => {
            tracing::debug!(
                prompt_id = ?data.prompt_id,
                value = data.value,
                max = data.max,
                "Generation progress",
            );
        }
        ComfyUIMessage::Executed(data) => {
            tracing::debug!(
                prompt_id = %data.prompt_id,
                node = ?data.node,
                "Node executed with output",
            );
        }
        ComfyUIMessage::ExecutionError(data) => {
            tracing::error!(
                prompt_id = %data.prompt_id,
                node_id = ?data.node_id,
                error_type = ?data.exception_type,
                error_message = %data.message(),
                "Execution error",
            );
        }
    }
}
