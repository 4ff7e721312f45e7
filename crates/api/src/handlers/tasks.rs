//! Handlers for the department task tracker.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use taskfeed_core::dispatch::LinkedReference;
use taskfeed_core::types::DbId;
use validator::Validate;

use crate::context::Tenant;
use crate::error::AppResult;
use crate::handlers::posts::ReasonRequest;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CompleteTaskRequest {
    #[validate(length(max = 4000, message = "Notes must be at most 4000 characters"))]
    pub notes: Option<String>,
    /// Record that closed the task out, e.g. an inspection form.
    pub linked_reference: Option<LinkedReference>,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentTaskParams {
    /// Only pending and in-progress tasks (default `true`).
    pub open_only: Option<bool>,
}

/// GET /api/v1/task-feed/departments/{code}/tasks
pub async fn list_department_tasks(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<DepartmentTaskParams>,
) -> AppResult<impl IntoResponse> {
    let tasks = state
        .task_feed
        .list_department_tasks(&ctx, &code, params.open_only.unwrap_or(true))
        .await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// POST /api/v1/task-feed/tasks/{id}/start
pub async fn start_task(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let transition = state.task_feed.start_task(&ctx, id).await?;
    Ok(Json(DataResponse { data: transition }))
}

/// POST /api/v1/task-feed/tasks/{id}/complete
///
/// Responds 409 `ALREADY_COMPLETED` when the task was completed before.
pub async fn complete_task(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CompleteTaskRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let transition = state
        .task_feed
        .complete_task(&ctx, id, input.notes, input.linked_reference)
        .await?;
    Ok(Json(DataResponse { data: transition }))
}

/// POST /api/v1/task-feed/tasks/{id}/skip
pub async fn skip_task(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ReasonRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let transition = state.task_feed.skip_task(&ctx, id, &input.reason).await?;
    Ok(Json(DataResponse { data: transition }))
}
