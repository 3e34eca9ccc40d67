//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection configuration for one ComfyUI
//! server and the client identity shared with prompt submission. Call
//! [`ComfyUIClient::connect`] to establish a live [`ComfyUIConnection`].

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// The raw WebSocket stream type produced by [`ComfyUIClient::connect`].
pub type ComfyUIStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI instance's event stream.
///
/// ComfyUI addresses execution events to the `clientId` a prompt was
/// submitted with, so the same `client_id` must be used here and in
/// [`ComfyUIApi`](crate::api::ComfyUIApi).
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
    client_id: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: ComfyUIStream,
}

impl ComfyUIClient {
    /// Create a new client.
    ///
    /// * `ws_url`    - WebSocket base URL, e.g. `ws://host:8188`.
    /// * `client_id` - identity shared with prompt submission.
    pub fn new(ws_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            client_id: client_id.into(),
        }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Full event-stream endpoint including the `clientId` query parameter.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/ws?clientId={}",
            self.ws_url.trim_end_matches('/'),
            self.client_id
        )
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let (ws_stream, _response) = connect_async(self.endpoint()).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %self.client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: self.client_id.clone(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_client_id() {
        let client = ComfyUIClient::new("ws://127.0.0.1:8188/", "abc");
        assert_eq!(client.endpoint(), "ws://127.0.0.1:8188/ws?clientId=abc");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let client = ComfyUIClient::new("ws://127.0.0.1:1", "abc");
        match client.connect().await {
            Err(ComfyUIClientError::Connection(msg)) => assert!(msg.contains("127.0.0.1:1")),
            Ok(_) => panic!("Expected connection failure"),
        }
    }
}
