//! Handlers for post fan-out, post queries and operator overrides.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use taskfeed_core::post::{PostMetadata, PostStatus};
use taskfeed_core::types::DbId;
use taskfeed_workflow::store::DEFAULT_POST_LIMIT;
use taskfeed_workflow::PostFilter;
use validator::Validate;

use crate::context::Tenant;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Upper bound for `?limit=` on post listings.
const MAX_POST_LIMIT: i64 = 200;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(range(min = 1, message = "template_id must be positive"))]
    pub template_id: DbId,
    /// Raw form values keyed by field id; validated against the template.
    #[serde(default)]
    pub form_data: serde_json::Value,
    #[validate(url(message = "photo_url must be a valid URL"))]
    pub photo_url: Option<String>,
    #[validate(length(max = 50))]
    pub source_department: Option<String>,
    #[validate(length(max = 4000, message = "Notes must be at most 4000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostListParams {
    /// One of the `PostStatus` names, e.g. `in_progress`.
    pub status: Option<String>,
    pub template_id: Option<DbId>,
    /// Only posts fanned out to this department.
    pub department: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 2000, message = "A reason of 1-2000 characters is required"))]
    pub reason: String,
}

/// POST /api/v1/task-feed/posts
///
/// Responds 201 with the post, its department tasks and one outcome per
/// workflow rule. Side-effect failures appear as outcome warnings.
pub async fn create_post(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Json(input): Json<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let metadata = PostMetadata {
        photo_url: input.photo_url,
        source_department: input.source_department,
        notes: input.notes,
    };
    let created = state
        .task_feed
        .create_post(&ctx, input.template_id, &input.form_data, metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/v1/task-feed/posts
pub async fn list_posts(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Query(params): Query<PostListParams>,
) -> AppResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<PostStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;
    let filter = PostFilter {
        status,
        template_id: params.template_id,
        department_code: params.department,
        limit: params
            .limit
            .unwrap_or(DEFAULT_POST_LIMIT)
            .clamp(1, MAX_POST_LIMIT),
        offset: params.offset.unwrap_or(0).max(0),
    };
    let posts = state.task_feed.list_posts(&ctx, &filter).await?;
    Ok(Json(DataResponse { data: posts }))
}

/// GET /api/v1/task-feed/posts/{id}
pub async fn get_post(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let detail = state.task_feed.get_post(&ctx, id).await?;
    Ok(Json(DataResponse { data: detail }))
}

/// POST /api/v1/task-feed/posts/{id}/reevaluate
pub async fn reevaluate_rules(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcomes = state.task_feed.reevaluate_rules(&ctx, id).await?;
    Ok(Json(DataResponse { data: outcomes }))
}

/// POST /api/v1/task-feed/posts/{id}/cancel
pub async fn cancel_post(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ReasonRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let cancellation = state.task_feed.cancel_post(&ctx, id, &input.reason).await?;
    Ok(Json(DataResponse { data: cancellation }))
}

/// POST /api/v1/task-feed/posts/{id}/followup
pub async fn flag_followup(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ReasonRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let post = state.task_feed.flag_followup(&ctx, id, &input.reason).await?;
    Ok(Json(DataResponse { data: post }))
}

/// DELETE /api/v1/task-feed/posts/{id}/followup
pub async fn clear_followup(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let post = state.task_feed.clear_followup(&ctx, id).await?;
    Ok(Json(DataResponse { data: post }))
}
