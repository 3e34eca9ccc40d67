#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tapnow_comfyui::api::GenerationEngine;
use tapnow_comfyui::messages::{parse_message, OutputImage};
use tapnow_comfyui::processor::MessageHandler;
use tapnow_core::error::CoreError;
use tapnow_core::templates::FsTemplateStore;
use tapnow_core::workflow::WorkflowGraph;
use tapnow_worker::config::EngineConfig;
use tapnow_worker::orchestrator::Orchestrator;
use tempfile::TempDir;
use tower::ServiceExt;

use tapnow_api::config::ServerConfig;
use tapnow_api::router::build_app_router;
use tapnow_api::state::AppState;

/// Prompt id the fake engine assigns to every submission.
pub const PROMPT_ID: &str = "prompt-1";

/// Engine that accepts every prompt without running it.
pub struct FakeEngine;

#[async_trait::async_trait]
impl GenerationEngine for FakeEngine {
    async fn submit_prompt(&self, _graph: &WorkflowGraph) -> Result<String, CoreError> {
        Ok(PROMPT_ID.to_string())
    }

    fn output_url(&self, image: &OutputImage) -> String {
        format!(
            "http://comfy.test/view?filename={}&type={}&subfolder={}",
            image.filename, image.kind, image.subfolder
        )
    }
}

/// A router wired to a real orchestrator with a fake engine and a
/// temporary template directory holding `txt2img`.
pub struct TestApp {
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    _workflows: TempDir,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(workflows: &std::path::Path) -> ServerConfig {
    let mut engine = EngineConfig::new("http://comfy.test");
    engine.workflows_dir = workflows.to_path_buf();
    engine.poll_interval = Duration::from_millis(10);
    engine.job_timeout = Duration::from_secs(5);

    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        engine,
    }
}

/// Build the full application router with all middleware layers.
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    let workflows = tempfile::tempdir().unwrap();
    let template = workflows.path().join("txt2img");
    std::fs::create_dir_all(&template).unwrap();
    std::fs::write(
        template.join("template.json"),
        json!({
            "3": {"class_type": "KSampler", "inputs": {"seed": 0}},
            "9": {"class_type": "SaveImage", "inputs": {}},
        })
        .to_string(),
    )
    .unwrap();

    let config = test_config(workflows.path());
    let orchestrator = Orchestrator::start_with(
        Arc::new(FakeEngine),
        Arc::new(FsTemplateStore::new(workflows.path())),
        None,
        &config.engine,
    );
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
    };

    TestApp {
        router: build_app_router(state, &config),
        orchestrator,
        _workflows: workflows,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> Response {
        get(self.router.clone(), uri).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        post_json(self.router.clone(), uri, body).await
    }

    /// Feed a raw ComfyUI frame to the orchestrator as if it came from
    /// the event stream.
    pub async fn engine_event(&self, raw: Value) {
        let message = parse_message(&raw.to_string()).unwrap();
        self.orchestrator.correlator().handle(message).await;
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_terminal(&self, id: &str) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let json = body_json(self.get(&format!("/comfy/status/{id}")).await).await;
                if json["status"] == "success" || json["status"] == "failed" {
                    return json;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job should finish")
    }

    /// Poll until the worker has submitted the job to the engine.
    pub async fn wait_submitted(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.orchestrator.get_status(PROMPT_ID).await.is_err() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job should be submitted")
    }
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
