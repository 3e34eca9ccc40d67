//! Handlers for the ComfyUI task API.
//!
//! Task creation accepts the loosely-shaped bodies of several client
//! dialects (see [`SubmitRequest::from_body`]); lookups accept either the
//! job id or ComfyUI's prompt id.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tapnow_core::job::{JobView, SubmitRequest};

use crate::error::{AppError, AppResult};
use crate::response::{CreateTaskResponse, OpenApiResponse, TaskDetail, TaskOutputs};
use crate::state::AppState;

/// `?requestId=` / `?request_id=` / `?taskId=` lookup parameters.
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    #[serde(rename = "requestId")]
    pub request_id_camel: Option<String>,
    pub request_id: Option<String>,
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
}

impl TaskQuery {
    /// First non-empty id, in `requestId`, `request_id`, `taskId` order.
    pub fn id(&self) -> Option<&str> {
        [&self.request_id_camel, &self.request_id, &self.task_id]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    fn require_id(&self) -> AppResult<&str> {
        self.id()
            .ok_or_else(|| AppError::BadRequest("Missing requestId".into()))
    }
}

#[derive(Debug, Serialize)]
pub struct AppsResponse {
    pub apps: Vec<String>,
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// GET /comfy/apps
pub async fn list_apps(State(state): State<AppState>) -> AppResult<Json<AppsResponse>> {
    let apps = state.orchestrator.list_apps().await?;
    Ok(Json(AppsResponse { apps }))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /comfy/queue (and the BizyAir / RunningHub create aliases)
///
/// Queues a job and returns immediately with its id.
pub async fn create_task(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<CreateTaskResponse>> {
    let body = parse_body(&body)?;
    let request = SubmitRequest::from_body(&body)?;
    let job_id = state.orchestrator.submit(request).await?;

    tracing::info!(job_id = %job_id, "Task created");
    Ok(Json(CreateTaskResponse::queued(job_id)))
}

/// An empty body reads as `{}` so it fails with the usual missing-field
/// message rather than a parse error.
fn parse_body(body: &[u8]) -> AppResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// GET /comfy/status/{id}
///
/// Raw job snapshot.
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobView>> {
    Ok(Json(state.orchestrator.get_status(&id).await?))
}

/// GET /comfy/outputs/{id}
pub async fn get_outputs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<OpenApiResponse<TaskOutputs>>> {
    outputs_for(&state, &id).await
}

/// GET /comfy/outputs?requestId= (and the task-outputs aliases)
pub async fn query_outputs(
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> AppResult<Json<OpenApiResponse<TaskOutputs>>> {
    outputs_for(&state, query.require_id()?).await
}

/// GET /comfy/detail?requestId= (and the task-detail aliases)
pub async fn query_detail(
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> AppResult<Json<OpenApiResponse<TaskDetail>>> {
    let job = state.orchestrator.get_status(query.require_id()?).await?;
    Ok(Json(OpenApiResponse::ok(TaskDetail::from(&job))))
}

async fn outputs_for(state: &AppState, id: &str) -> AppResult<Json<OpenApiResponse<TaskOutputs>>> {
    let job = state.orchestrator.get_status(id).await?;
    Ok(Json(OpenApiResponse::ok(TaskOutputs::from(&job))))
}
