//! The single worker loop.
//!
//! Takes one job at a time off the intake queue, builds its graph,
//! submits it to ComfyUI and waits for the correlator to buffer an image
//! (or for an execution error, the job budget, or shutdown).

use std::sync::Arc;

use tapnow_comfyui::api::GenerationEngine;
use tapnow_comfyui::messages::OutputImage;
use tapnow_core::error::CoreError;
use tapnow_core::injector;
use tapnow_core::job::{Job, JobStatus, JobTarget};
use tapnow_core::templates::TemplateStore;
use tapnow_core::types::JobId;
use tapnow_core::workflow::WorkflowGraph;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::registry::{ExecutionPoll, JobRegistry};

/// Error recorded on a job that was still running at shutdown.
pub const SHUTDOWN_ERROR: &str = "Orchestrator shut down before the job finished";

/// How a wait on an execution ended.
#[derive(Debug)]
enum WaitOutcome {
    Outputs(Vec<OutputImage>),
    Finished(JobStatus),
    TimedOut,
    Shutdown,
}

/// Drives queued jobs through the generation engine, one at a time.
pub struct JobWorker {
    registry: Arc<JobRegistry>,
    engine: Arc<dyn GenerationEngine>,
    templates: Arc<dyn TemplateStore>,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(
        registry: Arc<JobRegistry>,
        engine: Arc<dyn GenerationEngine>,
        templates: Arc<dyn TemplateStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            registry,
            engine,
            templates,
            config,
        }
    }

    /// Run the worker loop until the cancellation token is triggered or
    /// the queue is closed.
    pub async fn run(&self, mut queue: mpsc::UnboundedReceiver<JobId>, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "Job worker started",
        );

        loop {
            let job_id = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };
            self.process(job_id, &cancel).await;
        }

        tracing::info!("Job worker shutting down");
    }

    /// Run one job to a terminal state.
    pub async fn process(&self, job_id: JobId, cancel: &CancellationToken) {
        let Some(job) = self.registry.start(job_id).await else {
            tracing::warn!(job_id = %job_id, "Skipping job that is not queued");
            return;
        };
        tracing::info!(
            job_id = %job_id,
            app_id = job.target.app_id().unwrap_or("<inline>"),
            "Processing job",
        );

        let deadline = Instant::now() + self.config.job_timeout;
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(job_id = %job_id, "Abandoning submission on shutdown");
                self.registry.fail(job_id, SHUTDOWN_ERROR).await;
                return;
            }
            result = tokio::time::timeout_at(deadline, self.submit(&job)) => {
                result.unwrap_or_else(|_| Err(self.timeout_error()))
            }
        };
        let execution_id = match submitted {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to submit job");
                self.registry.fail(job_id, &e.job_message()).await;
                return;
            }
        };

        if !self.registry.attach_execution(job_id, &execution_id).await {
            tracing::warn!(
                job_id = %job_id,
                prompt_id = %execution_id,
                "Job finished before its execution could be tracked",
            );
            return;
        }
        tracing::info!(job_id = %job_id, prompt_id = %execution_id, "Workflow submitted to ComfyUI");

        match self.await_outputs(job_id, &execution_id, deadline, cancel).await {
            WaitOutcome::Outputs(images) => {
                let urls: Vec<String> = images.iter().map(|i| self.engine.output_url(i)).collect();
                let count = urls.len();
                if self.registry.complete(job_id, urls).await {
                    tracing::info!(job_id = %job_id, prompt_id = %execution_id, images = count, "Job completed");
                }
            }
            WaitOutcome::Finished(status) => {
                tracing::info!(job_id = %job_id, prompt_id = %execution_id, status = %status, "Job finished during execution");
            }
            WaitOutcome::TimedOut => {
                let err = self.timeout_error();
                tracing::error!(job_id = %job_id, prompt_id = %execution_id, error = %err, "Job timed out");
                self.registry.fail(job_id, &err.job_message()).await;
            }
            WaitOutcome::Shutdown => {
                tracing::warn!(job_id = %job_id, prompt_id = %execution_id, "Abandoning job on shutdown");
                self.registry.fail(job_id, SHUTDOWN_ERROR).await;
            }
        }

        self.registry.release(&execution_id).await;
    }

    fn timeout_error(&self) -> CoreError {
        CoreError::Timeout {
            secs: self.config.job_timeout.as_secs(),
        }
    }

    /// Build the job's graph and queue it on the engine.
    async fn submit(&self, job: &Job) -> Result<String, CoreError> {
        let graph = self.prepare(job).await?;
        self.engine.submit_prompt(&graph).await
    }

    async fn prepare(&self, job: &Job) -> Result<WorkflowGraph, CoreError> {
        let app_id = match &job.target {
            JobTarget::Inline(graph) => return Ok(graph.clone()),
            JobTarget::Template(app_id) => app_id,
        };

        let template = self.templates.load(app_id).await?;
        let mut graph = template.graph;
        if let Some(inputs) = &job.inputs {
            let report = injector::apply(&mut graph, &template.params_map, inputs);
            if !report.is_clean() {
                tracing::warn!(
                    job_id = %job.id,
                    applied = report.applied,
                    missing_nodes = ?report.missing_nodes,
                    failures = report.failures.len(),
                    "Some inputs could not be injected",
                );
            }
        }
        Ok(graph)
    }

    async fn await_outputs(
        &self,
        job_id: JobId,
        execution_id: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        loop {
            match self.registry.poll(job_id, execution_id).await {
                ExecutionPoll::Outputs(images) => return WaitOutcome::Outputs(images),
                ExecutionPoll::Finished(status) => return WaitOutcome::Finished(status),
                ExecutionPoll::Waiting => {}
            }
            if Instant::now() >= deadline {
                return WaitOutcome::TimedOut;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return WaitOutcome::Shutdown,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}
