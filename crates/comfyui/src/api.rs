//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps prompt submission (`POST /prompt`) and builds output URLs for
//! the `/view` static-file endpoint using [`reqwest`].

use serde::Deserialize;
use tapnow_core::error::CoreError;
use tapnow_core::workflow::WorkflowGraph;

use crate::messages::OutputImage;

/// UTF-8 byte-order mark tolerated at the start of response bodies.
const BOM: char = '\u{feff}';

/// The operations the orchestrator needs from a generation engine.
///
/// [`ComfyUIApi`] is the production implementation; tests substitute an
/// in-memory engine.
#[async_trait::async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Queue a filled graph and return the engine's execution identifier.
    async fn submit_prompt(&self, graph: &WorkflowGraph) -> Result<String, CoreError>;

    /// Locator for a produced file.
    fn output_url(&self, image: &OutputImage) -> String;
}

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i64,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// ComfyUI answered 2xx but the body was not what `/prompt` returns.
    #[error("Unexpected ComfyUI response: {0}")]
    InvalidResponse(String),
}

impl From<ComfyUIApiError> for CoreError {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => CoreError::EngineUnreachable(e.to_string()),
            other => CoreError::EngineRejected(other.to_string()),
        }
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url`   - Base HTTP URL, e.g. `http://host:8188`.
    /// * `client_id` - identity shared with the event listener.
    pub fn new(api_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, client_id)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// this client's ID. Returns the server-assigned `prompt_id` and
    /// queue position.
    pub async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "client_id": self.client_id,
            "prompt": workflow,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// URL of a produced file on ComfyUI's `/view` endpoint.
    pub fn view_url(&self, image: &OutputImage) -> String {
        let base = format!("{}/view", self.api_url);
        let params = [
            ("filename", image.filename.as_str()),
            ("type", image.kind.as_str()),
            ("subfolder", image.subfolder.as_str()),
        ];
        match reqwest::Url::parse_with_params(&base, &params) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{base}?filename={}&type={}&subfolder={}",
                image.filename, image.kind, image.subfolder
            ),
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(text.trim_start_matches(BOM))
            .map_err(|e| ComfyUIApiError::InvalidResponse(format!("{e}: {text}")))
    }
}

#[async_trait::async_trait]
impl GenerationEngine for ComfyUIApi {
    async fn submit_prompt(&self, graph: &WorkflowGraph) -> Result<String, CoreError> {
        let response = self.submit_workflow(graph).await?;
        tracing::debug!(
            prompt_id = %response.prompt_id,
            queue_position = response.number,
            "Prompt queued on ComfyUI",
        );
        Ok(response.prompt_id)
    }

    fn output_url(&self, image: &OutputImage) -> String {
        self.view_url(image)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    /// Serve `router` on an ephemeral local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn graph() -> WorkflowGraph {
        WorkflowGraph::from_value(json!({"1": {"class_type": "SaveImage", "inputs": {}}})).unwrap()
    }

    #[tokio::test]
    async fn submit_sends_client_id_and_prompt() {
        let router = Router::new().route(
            "/prompt",
            post(|Json(body): Json<Value>| async move {
                let prompt_id = format!(
                    "{}/{}",
                    body["client_id"].as_str().unwrap_or_default(),
                    body["prompt"]["1"]["class_type"].as_str().unwrap_or_default()
                );
                Json(json!({"prompt_id": prompt_id, "number": 4, "node_errors": {}}))
            }),
        );
        let api = ComfyUIApi::new(serve(router).await, "client-1");

        let response = api.submit_workflow(&graph()).await.unwrap();
        assert_eq!(response.prompt_id, "client-1/SaveImage");
        assert_eq!(response.number, 4);
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let router = Router::new().route(
            "/prompt",
            post(|| async { (StatusCode::BAD_REQUEST, "invalid prompt") }),
        );
        let api = ComfyUIApi::new(serve(router).await, "c");

        let err = api.submit_workflow(&graph()).await.unwrap_err();
        assert_matches!(&err, ComfyUIApiError::ApiError { status: 400, body } if body == "invalid prompt");
        assert_matches!(CoreError::from(err), CoreError::EngineRejected(_));
    }

    #[tokio::test]
    async fn missing_prompt_id_is_rejected() {
        let router = Router::new().route("/prompt", post(|| async { Json(json!({"number": 1})) }));
        let api = ComfyUIApi::new(serve(router).await, "c");

        let err = api.submit_prompt(&graph()).await.unwrap_err();
        assert_matches!(err, CoreError::EngineRejected(_));
    }

    #[tokio::test]
    async fn unreachable_engine_is_reported() {
        let api = ComfyUIApi::new("http://127.0.0.1:1", "c");
        let err = api.submit_prompt(&graph()).await.unwrap_err();
        assert_matches!(err, CoreError::EngineUnreachable(_));
    }

    #[test]
    fn view_url_encodes_parameters() {
        let api = ComfyUIApi::new("http://127.0.0.1:8188/", "c");
        let url = api.view_url(&OutputImage {
            filename: "my image.png".into(),
            subfolder: "batch/1".into(),
            kind: "output".into(),
        });
        assert_eq!(
            url,
            "http://127.0.0.1:8188/view?filename=my+image.png&type=output&subfolder=batch%2F1"
        );
    }

    #[test]
    fn view_url_with_empty_subfolder() {
        let api = ComfyUIApi::new("http://127.0.0.1:8188", "c");
        let url = api.output_url(&OutputImage {
            filename: "a.png".into(),
            subfolder: String::new(),
            kind: "output".into(),
        });
        assert_eq!(url, "http://127.0.0.1:8188/view?filename=a.png&type=output&subfolder=");
    }
}
