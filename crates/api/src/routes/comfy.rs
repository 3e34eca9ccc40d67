//! Route definitions for the ComfyUI task API.
//!
//! The `/task/openapi/*` and `/w/v1/webapp/task/openapi/*` paths are the
//! RunningHub and BizyAir spellings of the same operations.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::comfy;
use crate::state::AppState;

/// Paths that create a task.
pub const CREATE_PATHS: [&str; 4] = [
    "/comfy/queue",
    "/task/openapi/create",
    "/task/openapi/ai-app/run",
    "/w/v1/webapp/task/openapi/create",
];

/// Paths that return task outputs for `?requestId=`.
pub const OUTPUTS_PATHS: [&str; 3] = [
    "/comfy/outputs",
    "/task/openapi/outputs",
    "/w/v1/webapp/task/openapi/outputs",
];

/// Paths that return task detail for `?requestId=`.
pub const DETAIL_PATHS: [&str; 3] = [
    "/comfy/detail",
    "/task/openapi/detail",
    "/w/v1/webapp/task/openapi/detail",
];

/// Task routes, mounted at the root.
///
/// ```text
/// GET    /comfy/apps             -> list_apps
/// GET    /comfy/status/{id}      -> get_status
/// GET    /comfy/outputs/{id}     -> get_outputs
/// POST   CREATE_PATHS            -> create_task
/// GET    OUTPUTS_PATHS           -> query_outputs
/// GET    DETAIL_PATHS            -> query_detail
/// ```
pub fn router() -> Router<AppState> {
    let mut router = Router::new()
        .route("/comfy/apps", get(comfy::list_apps))
        .route("/comfy/status/{id}", get(comfy::get_status))
        .route("/comfy/outputs/{id}", get(comfy::get_outputs));

    for path in CREATE_PATHS {
        router = router.route(path, post(comfy::create_task));
    }
    for path in OUTPUTS_PATHS {
        router = router.route(path, get(comfy::query_outputs));
    }
    for path in DETAIL_PATHS {
        router = router.route(path, get(comfy::query_detail));
    }
    router
}
