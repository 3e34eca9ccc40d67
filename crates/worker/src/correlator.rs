//! Folds ComfyUI events into job state.
//!
//! Plugged into the event listener as its [`MessageHandler`]. Only
//! `executed`, `progress` and `execution_error` touch the registry;
//! everything else has already been logged by the processor.

use std::sync::Arc;

use tapnow_comfyui::messages::ComfyUIMessage;
use tapnow_comfyui::processor::MessageHandler;
use tapnow_core::error::CoreError;
use tapnow_core::job::Progress;

use crate::registry::JobRegistry;

/// Routes engine events to the jobs they belong to.
#[derive(Clone)]
pub struct Correlator {
    registry: Arc<JobRegistry>,
}

impl Correlator {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl MessageHandler for Correlator {
    async fn handle(&self, message: ComfyUIMessage) {
        match message {
            ComfyUIMessage::Executed(data) => {
                let prompt_id = data.prompt_id.clone();
                if !self.registry.record_executed(data).await {
                    tracing::debug!(prompt_id = %prompt_id, "Discarding output for finished job");
                }
            }
            ComfyUIMessage::Progress(data) => {
                // Progress without a prompt id cannot be attributed.
                let Some(prompt_id) = data.prompt_id else {
                    return;
                };
                self.registry
                    .update_progress(&prompt_id, Progress::new(data.value, data.max))
                    .await;
            }
            ComfyUIMessage::ExecutionError(data) => {
                let err = CoreError::ExecutionError(data.message().to_string());
                if let Some(job_id) = self.registry.fail_execution(&data.prompt_id, &err).await {
                    tracing::warn!(
                        job_id = %job_id,
                        prompt_id = %data.prompt_id,
                        error = %err,
                        "Job failed during execution",
                    );
                }
            }
            ComfyUIMessage::Status(_)
            | ComfyUIMessage::ExecutionStart(_)
            | ComfyUIMessage::ExecutionCached(_)
            | ComfyUIMessage::Executing(_) => {}
        }
    }
}
