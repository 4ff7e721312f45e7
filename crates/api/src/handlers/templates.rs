//! Handlers for the template store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use taskfeed_core::department::TriggeringDepartment;
use taskfeed_core::form::FormField;
use taskfeed_core::rules::WorkflowRule;
use taskfeed_core::template::{ButtonType, TemplateDefinition, TemplatePatch};
use taskfeed_core::types::DbId;
use taskfeed_workflow::TemplateFilter;
use validator::Validate;

use crate::context::Tenant;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    pub button_type: ButtonType,
    /// Department code or `any` (the default).
    pub triggering_department: Option<String>,
    #[validate(length(min = 1, message = "At least one department must be assigned"))]
    pub assigned_departments: Vec<String>,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
    #[serde(default)]
    pub photo_required: bool,
    #[serde(default)]
    pub workflow_rules: Vec<WorkflowRule>,
    pub is_active: Option<bool>,
}

impl From<CreateTemplateRequest> for TemplateDefinition {
    fn from(req: CreateTemplateRequest) -> Self {
        TemplateDefinition {
            name: req.name.trim().to_string(),
            description: req.description,
            button_type: req.button_type,
            triggering_department: req
                .triggering_department
                .map(TriggeringDepartment::from)
                .unwrap_or(TriggeringDepartment::Any),
            assigned_departments: req.assigned_departments,
            form_fields: req.form_fields,
            photo_required: req.photo_required,
            workflow_rules: req.workflow_rules,
            is_active: req.is_active.unwrap_or(true),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TemplateListParams {
    #[serde(default)]
    pub active_only: bool,
    pub triggering_department: Option<String>,
    pub button_type: Option<ButtonType>,
}

/// POST /api/v1/task-feed/templates
pub async fn create_template(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Json(input): Json<CreateTemplateRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let template = state.task_feed.create_template(&ctx, input.into()).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: template })))
}

/// GET /api/v1/task-feed/templates
pub async fn list_templates(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Query(params): Query<TemplateListParams>,
) -> AppResult<impl IntoResponse> {
    let filter = TemplateFilter {
        active_only: params.active_only,
        triggering_department: params.triggering_department,
        button_type: params.button_type,
    };
    let templates = state.task_feed.list_templates(&ctx, &filter).await?;
    Ok(Json(DataResponse { data: templates }))
}

/// GET /api/v1/task-feed/templates/{id}
pub async fn get_template(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let template = state.task_feed.get_template(&ctx, id).await?;
    Ok(Json(DataResponse { data: template }))
}

/// PATCH /api/v1/task-feed/templates/{id}
///
/// Returns the new version when the template was already in use.
pub async fn update_template(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(patch): Json<TemplatePatch>,
) -> AppResult<impl IntoResponse> {
    let template = state.task_feed.update_template(&ctx, id, patch).await?;
    Ok(Json(DataResponse { data: template }))
}

/// POST /api/v1/task-feed/templates/seed
pub async fn seed_defaults(
    Tenant(ctx): Tenant,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let report = state.task_feed.seed_defaults(&ctx).await;
    Ok(Json(DataResponse { data: report }))
}
