//! Orchestrator lifecycle.
//!
//! [`Orchestrator::start`] builds the engine client, template store and
//! registry, then spawns the worker loop and the event listener. Both
//! tasks share one [`CancellationToken`]; [`Orchestrator::shutdown`]
//! triggers it and waits for them to exit.

use std::sync::Arc;
use std::time::Duration;

use tapnow_comfyui::api::{ComfyUIApi, GenerationEngine};
use tapnow_comfyui::client::ComfyUIClient;
use tapnow_comfyui::listener::spawn_listener;
use tapnow_core::error::CoreError;
use tapnow_core::job::{JobTarget, JobView, SubmitRequest};
use tapnow_core::templates::{FsTemplateStore, TemplateStore};
use tapnow_core::types::JobId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::correlator::Correlator;
use crate::registry::JobRegistry;
use crate::worker::JobWorker;

/// How long [`Orchestrator::shutdown`] waits for each background task.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry point for submitting and inspecting generation jobs.
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    templates: Arc<dyn TemplateStore>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Start an orchestrator against the ComfyUI instance in `config`.
    ///
    /// Prompt submission and the event listener share one freshly
    /// generated client id so ComfyUI routes execution events to us.
    pub fn start(config: &EngineConfig) -> Arc<Self> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let engine = Arc::new(ComfyUIApi::new(&config.comfy_url, &client_id));
        let templates = Arc::new(FsTemplateStore::new(&config.workflows_dir));
        let listener = ComfyUIClient::new(&config.comfy_ws_url, &client_id);

        tracing::info!(
            comfy_url = %config.comfy_url,
            comfy_ws_url = %config.comfy_ws_url,
            workflows_dir = %config.workflows_dir.display(),
            client_id = %client_id,
            "Starting orchestrator",
        );
        Self::start_with(engine, templates, Some(listener), config)
    }

    /// Start with explicit collaborators. Without a `listener` no engine
    /// events arrive on their own; feed them through [`Self::correlator`].
    pub fn start_with(
        engine: Arc<dyn GenerationEngine>,
        templates: Arc<dyn TemplateStore>,
        listener: Option<ComfyUIClient>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let (registry, queue) = JobRegistry::new();
        let registry = Arc::new(registry);
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let worker = JobWorker::new(
            Arc::clone(&registry),
            engine,
            Arc::clone(&templates),
            config.worker(),
        );
        let worker_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            worker.run(queue, worker_cancel).await;
        }));

        if let Some(client) = listener {
            tasks.push(spawn_listener(
                client,
                Arc::new(Correlator::new(Arc::clone(&registry))),
                config.reconnect(),
                cancel.clone(),
            ));
        }

        Arc::new(Self {
            registry,
            templates,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    /// Validate and queue a job. Returns as soon as the job is queued.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobId, CoreError> {
        if let JobTarget::Template(app_id) = &request.target {
            if !self.templates.exists(app_id).await? {
                return Err(CoreError::template_not_found(app_id));
            }
        }

        let app_id = request.target.app_id().map(str::to_string);
        let id = self.registry.enqueue(request).await?;
        tracing::info!(
            job_id = %id,
            app_id = app_id.as_deref().unwrap_or("<inline>"),
            "Job queued",
        );
        Ok(id)
    }

    /// Snapshot of a job, looked up by job id or execution id.
    pub async fn get_status(&self, id: &str) -> Result<JobView, CoreError> {
        self.registry
            .resolve(id)
            .await
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Output locators of a job; empty until it succeeds.
    pub async fn get_outputs(&self, id: &str) -> Result<Vec<String>, CoreError> {
        Ok(self.get_status(id).await?.outputs().to_vec())
    }

    /// Names of the available workflow templates.
    pub async fn list_apps(&self) -> Result<Vec<String>, CoreError> {
        self.templates.list().await
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// A message handler that applies engine events to this
    /// orchestrator's jobs.
    pub fn correlator(&self) -> Correlator {
        Correlator::new(Arc::clone(&self.registry))
    }

    /// Stop the worker and the listener. A job that is mid-wait is failed.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Background task did not stop in time");
            }
        }
        tracing::info!("Orchestrator shut down");
    }
}
