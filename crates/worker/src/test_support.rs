use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use tapnow_comfyui::api::GenerationEngine;
use tapnow_comfyui::messages::{ExecutedData, OutputImage};
use tapnow_core::error::CoreError;
use tapnow_core::templates::TemplateStore;
use tapnow_core::workflow::{parse_params_map, Template, WorkflowGraph};

use crate::registry::JobRegistry;

/// Engine that accepts every prompt under a fixed execution id.
pub struct FakeEngine {
    prompt_id: String,
    reject: Option<CoreError>,
    /// Never answer a submission.
    stall: bool,
    pub submitted: Mutex<Vec<WorkflowGraph>>,
}

impl FakeEngine {
    pub fn accepting(prompt_id: &str) -> Self {
        Self {
            prompt_id: prompt_id.to_string(),
            reject: None,
            stall: false,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: CoreError) -> Self {
        Self {
            prompt_id: String::new(),
            reject: Some(err),
            stall: false,
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Accepts the request but never responds.
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::accepting("")
        }
    }
}

#[async_trait::async_trait]
impl GenerationEngine for FakeEngine {
    async fn submit_prompt(&self, graph: &WorkflowGraph) -> Result<String, CoreError> {
        if let Some(err) = &self.reject {
            return Err(err.clone());
        }
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.submitted.lock().unwrap().push(graph.clone());
        Ok(self.prompt_id.clone())
    }

    fn output_url(&self, image: &OutputImage) -> String {
        format!("http://engine/view?filename={}", image.filename)
    }
}

/// In-memory template store.
#[derive(Default)]
pub struct MemoryTemplates(HashMap<String, Template>);

impl MemoryTemplates {
    /// A single `txt2img` template whose `seed` parameter maps to node 3.
    pub fn txt2img() -> Self {
        let graph = WorkflowGraph::from_value(json!({
            "3": {"class_type": "KSampler", "inputs": {"seed": 0, "steps": 20}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "placeholder"}},
            "9": {"class_type": "SaveImage", "inputs": {}},
        }))
        .unwrap();
        let params_map =
            parse_params_map(&json!({"seed": {"node_id": "3", "field": "inputs.seed"}}));

        let mut templates = Self::default();
        templates
            .0
            .insert("txt2img".into(), Template { graph, params_map });
        templates
    }
}

#[async_trait::async_trait]
impl TemplateStore for MemoryTemplates {
    async fn load(&self, app_id: &str) -> Result<Template, CoreError> {
        self.0
            .get(app_id)
            .cloned()
            .ok_or_else(|| CoreError::template_not_found(app_id))
    }

    async fn exists(&self, app_id: &str) -> Result<bool, CoreError> {
        tapnow_core::templates::validate_app_id(app_id)?;
        Ok(self.0.contains_key(app_id))
    }

    async fn list(&self) -> Result<Vec<String>, CoreError> {
        let mut names: Vec<String> = self.0.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

pub fn executed(prompt_id: &str, filename: &str) -> ExecutedData {
    serde_json::from_value(json!({
        "node": "9",
        "prompt_id": prompt_id,
        "output": {"images": [{"filename": filename, "subfolder": "", "type": "output"}]},
    }))
    .unwrap()
}

/// Wait until some job has been bound to `execution_id`.
pub async fn wait_for_execution(registry: &JobRegistry, execution_id: &str) {
    while registry.resolve(execution_id).await.is_none() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
