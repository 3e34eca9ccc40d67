//! Generation job model and lifecycle state machine.
//!
//! A job moves `queued -> processing -> {success | failed}` and never
//! leaves a terminal state. Every mutator on [`Job`] enforces that and
//! reports whether it changed anything, so late or duplicate engine
//! events can be applied blindly and simply be discarded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::injector::JobInputs;
use crate::types::{JobId, Timestamp};
use crate::workflow::{scalar_to_string, WorkflowGraph};

/// Request body keys that may carry the template name.
pub const APP_ID_KEYS: [&str; 5] = ["app_id", "web_app_id", "webappId", "workflow_id", "appId"];

/// Request body keys that may carry the caller parameters.
pub const INPUT_KEYS: [&str; 3] = ["input_values", "inputs", "nodeInfoList"];

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Display label used by the task-detail API.
    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Processing => "Running",
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Progress / result
// ---------------------------------------------------------------------------

/// Step-level progress reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub value: i64,
    pub max: i64,
}

impl Progress {
    pub fn new(value: i64, max: i64) -> Self {
        Self { value, max }
    }

    /// Progress stamped on a successful job.
    pub fn complete() -> Self {
        Self::new(100, 100)
    }
}

/// Output locators of a successful job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Engine `/view` URLs, in the order the engine reported them.
    pub images: Vec<String>,
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// What a job runs: a stored template or a caller-supplied graph.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTarget {
    Template(String),
    Inline(WorkflowGraph),
}

impl JobTarget {
    pub fn app_id(&self) -> Option<&str> {
        match self {
            Self::Template(name) => Some(name),
            Self::Inline(_) => None,
        }
    }
}

/// A validated submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub target: JobTarget,
    pub inputs: Option<JobInputs>,
}

impl SubmitRequest {
    /// Run a stored template with the given inputs.
    pub fn template(app_id: impl Into<String>, inputs: Option<JobInputs>) -> Self {
        Self {
            target: JobTarget::Template(app_id.into()),
            inputs,
        }
    }

    /// Run a caller-supplied graph as-is.
    pub fn inline(graph: WorkflowGraph) -> Self {
        Self {
            target: JobTarget::Inline(graph),
            inputs: None,
        }
    }

    /// Interpret a loosely-shaped request body.
    ///
    /// The template name and the inputs are each looked up under several
    /// aliases (see [`APP_ID_KEYS`], [`INPUT_KEYS`]). A non-empty `prompt`
    /// object takes precedence over a template name.
    pub fn from_body(body: &Value) -> Result<Self, CoreError> {
        let Some(body) = body.as_object() else {
            return Err(CoreError::InvalidInput(
                "request body must be a JSON object".into(),
            ));
        };

        let prompt = body
            .get("prompt")
            .and_then(Value::as_object)
            .filter(|nodes| !nodes.is_empty());
        if let Some(nodes) = prompt {
            return Ok(Self::inline(WorkflowGraph::from(nodes.clone())));
        }

        let app_id = APP_ID_KEYS
            .iter()
            .filter_map(|k| body.get(*k).and_then(scalar_to_string))
            .find(|s| !s.is_empty())
            .ok_or_else(|| CoreError::InvalidInput("Missing app_id or prompt".into()))?;

        let inputs = INPUT_KEYS
            .iter()
            .filter_map(|k| body.get(*k))
            .find(|v| !v.is_null())
            .and_then(JobInputs::from_value);

        Ok(Self::template(app_id, inputs))
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Full job record as held by the registry.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub target: JobTarget,
    pub inputs: Option<JobInputs>,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    /// Engine-assigned `prompt_id`, once submitted.
    pub execution_id: Option<String>,
    pub progress: Progress,
    pub error: Option<String>,
    pub result: Option<JobResult>,
}

impl Job {
    /// Create a new `queued` job.
    pub fn new(request: SubmitRequest, now: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            target: request.target,
            inputs: request.inputs,
            status: JobStatus::Queued,
            created_at: now,
            started_at: None,
            finished_at: None,
            execution_id: None,
            progress: Progress::default(),
            error: None,
            result: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// `queued -> processing`; stamps the start time and resets progress.
    pub fn start(&mut self, now: Timestamp) -> bool {
        if !self.transition(JobStatus::Processing) {
            return false;
        }
        self.started_at = Some(now);
        self.progress = Progress::default();
        true
    }

    /// Overwrite progress unless the job is already terminal.
    pub fn set_progress(&mut self, progress: Progress) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.progress = progress;
        true
    }

    /// `processing -> success` with the collected output locators.
    pub fn succeed(&mut self, images: Vec<String>, now: Timestamp) -> bool {
        if !self.transition(JobStatus::Success) {
            return false;
        }
        self.result = Some(JobResult { images });
        self.progress = Progress::complete();
        self.finished_at = Some(now);
        true
    }

    /// `processing -> failed` with a human-readable error.
    pub fn fail(&mut self, error: impl Into<String>, now: Timestamp) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        self.finished_at = Some(now);
        true
    }

    /// Latest lifecycle timestamp.
    pub fn updated_at(&self) -> Timestamp {
        self.finished_at.or(self.started_at).unwrap_or(self.created_at)
    }

    /// Output locators, empty until the job succeeds.
    pub fn outputs(&self) -> &[String] {
        self.result.as_ref().map(|r| r.images.as_slice()).unwrap_or(&[])
    }

    /// Detached snapshot for callers.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            app_id: self.target.app_id().map(str::to_string),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            updated_at: self.updated_at(),
            prompt_id: self.execution_id.clone(),
            progress: self.progress,
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }
}

/// Read-only copy of a job's externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub app_id: Option<String>,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
    /// Engine execution identifier.
    pub prompt_id: Option<String>,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl JobView {
    pub fn outputs(&self) -> &[String] {
        self.result.as_ref().map(|r| r.images.as_slice()).unwrap_or(&[])
    }
}
