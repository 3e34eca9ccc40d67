//! In-memory job registry and intake queue.
//!
//! All mutable orchestration state lives behind one lock: the jobs
//! themselves, the correlation table of in-flight executions, the
//! buffered `executed` events per execution and a permanent index from
//! execution id to job. Callers only ever get copies back.

use std::collections::HashMap;

use chrono::Utc;
use tapnow_comfyui::messages::{ExecutedData, OutputImage};
use tapnow_core::error::CoreError;
use tapnow_core::job::{Job, JobStatus, JobView, Progress, SubmitRequest};
use tapnow_core::types::JobId;
use tokio::sync::{mpsc, Mutex};

/// Shared job state for one orchestrator.
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    queue: mpsc::UnboundedSender<JobId>,
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<JobId, Job>,
    /// execution id -> job, while the worker is waiting on it.
    active: HashMap<String, JobId>,
    /// execution id -> `executed` events received so far.
    buffers: HashMap<String, Vec<ExecutedData>>,
    /// execution id -> job, never pruned.
    executions: HashMap<String, JobId>,
    /// execution id -> error reported before the execution was attached.
    early_errors: HashMap<String, String>,
}

/// What the worker sees when it checks on a running execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionPoll {
    /// Nothing usable yet.
    Waiting,
    /// At least one image has been reported.
    Outputs(Vec<OutputImage>),
    /// The job reached a terminal status without the worker.
    Finished(JobStatus),
}

impl JobRegistry {
    /// Create an empty registry and the receiving end of its FIFO queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Self {
            state: Mutex::new(RegistryState::default()),
            queue: tx,
        };
        (registry, rx)
    }

    /// Record a new `queued` job and put it on the queue.
    pub async fn enqueue(&self, request: SubmitRequest) -> Result<JobId, CoreError> {
        let job = Job::new(request, Utc::now());
        let id = job.id;

        let mut state = self.state.lock().await;
        if self.queue.send(id).is_err() {
            return Err(CoreError::Internal("job queue is closed".into()));
        }
        state.jobs.insert(id, job);
        Ok(id)
    }

    pub async fn get(&self, id: JobId) -> Option<JobView> {
        self.state.lock().await.jobs.get(&id).map(Job::view)
    }

    /// Look a job up by its id or by the engine's execution id.
    pub async fn resolve(&self, id: &str) -> Option<JobView> {
        let id = id.trim();
        let state = self.state.lock().await;
        let job_id = match uuid::Uuid::parse_str(id) {
            Ok(job_id) if state.jobs.contains_key(&job_id) => job_id,
            _ => *state.executions.get(id)?,
        };
        state.jobs.get(&job_id).map(Job::view)
    }

    pub async fn status_of(&self, id: JobId) -> Option<JobStatus> {
        self.state.lock().await.jobs.get(&id).map(|job| job.status)
    }

    /// Move a queued job to `processing`. Returns a copy of the started
    /// job, or `None` if it is unknown or not queued.
    pub async fn start(&self, id: JobId) -> Option<Job> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&id)?;
        job.start(Utc::now()).then(|| job.clone())
    }

    /// Bind an engine execution to a running job so its events can be
    /// correlated.
    pub async fn attach_execution(&self, id: JobId, execution_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if !job.status.is_terminal() => {
                job.execution_id = Some(execution_id.to_string());
            }
            _ => return false,
        }
        state.active.insert(execution_id.to_string(), id);
        state.executions.insert(execution_id.to_string(), id);

        if let Some(error) = state.early_errors.remove(execution_id) {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.fail(error, Utc::now());
            }
        }
        true
    }

    /// Buffer an `executed` event. Events for executions whose job has
    /// already finished are discarded and `false` is returned.
    pub async fn record_executed(&self, event: ExecutedData) -> bool {
        let mut state = self.state.lock().await;
        let finished = state
            .executions
            .get(&event.prompt_id)
            .and_then(|job_id| state.jobs.get(job_id))
            .is_some_and(|job| job.status.is_terminal());
        if finished {
            return false;
        }
        state
            .buffers
            .entry(event.prompt_id.clone())
            .or_default()
            .push(event);
        true
    }

    /// Overwrite the progress of the job running `execution_id`.
    pub async fn update_progress(&self, execution_id: &str, progress: Progress) -> bool {
        let mut state = self.state.lock().await;
        let Some(job_id) = state.active.get(execution_id).copied() else {
            return false;
        };
        state
            .jobs
            .get_mut(&job_id)
            .is_some_and(|job| job.set_progress(progress))
    }

    /// Fail the job running `execution_id`. Returns the job id if a job
    /// actually changed state.
    ///
    /// An error for an execution no job has claimed yet is held until
    /// [`attach_execution`](Self::attach_execution) binds it.
    pub async fn fail_execution(&self, execution_id: &str, error: &CoreError) -> Option<JobId> {
        let mut state = self.state.lock().await;
        let Some(job_id) = state.active.get(execution_id).copied() else {
            if !state.executions.contains_key(execution_id) {
                state
                    .early_errors
                    .insert(execution_id.to_string(), error.job_message());
            }
            return None;
        };
        let job = state.jobs.get_mut(&job_id)?;
        job.fail(error.job_message(), Utc::now()).then_some(job_id)
    }

    /// Check a running execution for outputs or an out-of-band finish.
    pub async fn poll(&self, id: JobId, execution_id: &str) -> ExecutionPoll {
        let state = self.state.lock().await;
        match state.jobs.get(&id) {
            Some(job) if job.status.is_terminal() => return ExecutionPoll::Finished(job.status),
            Some(_) => {}
            None => return ExecutionPoll::Finished(JobStatus::Failed),
        }

        let images: Vec<OutputImage> = state
            .buffers
            .get(execution_id)
            .map(|events| events.iter().flat_map(ExecutedData::images).collect())
            .unwrap_or_default();
        if images.is_empty() {
            ExecutionPoll::Waiting
        } else {
            ExecutionPoll::Outputs(images)
        }
    }

    /// `processing -> success` with the given output locators.
    pub async fn complete(&self, id: JobId, outputs: Vec<String>) -> bool {
        let mut state = self.state.lock().await;
        state
            .jobs
            .get_mut(&id)
            .is_some_and(|job| job.succeed(outputs, Utc::now()))
    }

    /// `processing -> failed` with a human-readable error.
    pub async fn fail(&self, id: JobId, error: &str) -> bool {
        let mut state = self.state.lock().await;
        state
            .jobs
            .get_mut(&id)
            .is_some_and(|job| job.fail(error, Utc::now()))
    }

    /// Drop the correlation entry and event buffer of an execution.
    /// Safe to call more than once.
    pub async fn release(&self, execution_id: &str) {
        let mut state = self.state.lock().await;
        state.active.remove(execution_id);
        state.buffers.remove(execution_id);
    }

    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    /// Number of executions currently being waited on.
    pub async fn active_executions(&self) -> usize {
        self.state.lock().await.active.len()
    }
}
