//! Response envelopes for the task API.
//!
//! Task endpoints answer in the `{code, message, status, data}` shape that
//! BizyAir / RunningHub style clients expect. Use these types instead of
//! ad-hoc `serde_json::json!` bodies.

use serde::Serialize;
use tapnow_core::job::{JobStatus, JobView, Progress};
use tapnow_core::types::{JobId, Timestamp};

/// Success code carried by every task envelope.
pub const OK_CODE: i64 = 20000;

/// Timestamp format of the task-detail API.
pub const DETAIL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Standard `{code, message, status, data}` envelope.
#[derive(Debug, Serialize)]
pub struct OpenApiResponse<T: Serialize> {
    pub code: i64,
    pub message: &'static str,
    pub status: bool,
    pub data: T,
}

impl<T: Serialize> OpenApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: OK_CODE,
            message: "Ok",
            status: true,
            data,
        }
    }
}

/// Answer to a task creation request.
///
/// The job id is repeated under every name the supported clients read.
#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub code: i64,
    pub message: &'static str,
    pub status: bool,
    #[serde(rename = "requestId")]
    pub request_id_camel: String,
    pub request_id: String,
    pub job_id: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub data: CreatedTask,
}

#[derive(Debug, Serialize)]
pub struct CreatedTask {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub status: &'static str,
}

impl CreateTaskResponse {
    pub fn queued(id: JobId) -> Self {
        let id = id.to_string();
        Self {
            code: OK_CODE,
            message: "Ok",
            status: true,
            request_id_camel: id.clone(),
            request_id: id.clone(),
            job_id: id.clone(),
            task_id: id.clone(),
            data: CreatedTask {
                request_id: id.clone(),
                task_id: id,
                status: JobStatus::Queued.label(),
            },
        }
    }
}

/// `data` of a task-detail answer.
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub status: &'static str,
    pub created_at: String,
    pub updated_at: String,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&JobView> for TaskDetail {
    fn from(job: &JobView) -> Self {
        Self {
            request_id: job.id.to_string(),
            status: job.status.label(),
            created_at: format_timestamp(job.created_at),
            updated_at: format_timestamp(job.updated_at),
            progress: job.progress,
            error: job.error.clone(),
        }
    }
}

/// `data` of a task-outputs answer.
#[derive(Debug, Serialize)]
pub struct TaskOutputs {
    pub outputs: Vec<TaskOutput>,
}

#[derive(Debug, Serialize)]
pub struct TaskOutput {
    pub object_url: String,
}

impl From<&JobView> for TaskOutputs {
    fn from(job: &JobView) -> Self {
        Self {
            outputs: job
                .outputs()
                .iter()
                .map(|url| TaskOutput {
                    object_url: url.clone(),
                })
                .collect(),
        }
    }
}

/// Render a timestamp in server-local time.
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.with_timezone(&chrono::Local)
        .format(DETAIL_TIME_FORMAT)
        .to_string()
}
