//! Template row model.

use sqlx::FromRow;
use taskfeed_core::department::TriggeringDepartment;
use taskfeed_core::error::CoreError;
use taskfeed_core::template::{Template, TemplateDefinition};
use taskfeed_core::types::{DbId, Timestamp};

use super::{decode_json, parse_column};

/// A row from the `task_feed_templates` table.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub id: DbId,
    pub organization_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub button_type: String,
    pub triggering_department: String,
    pub assigned_departments: Vec<String>,
    pub form_fields: serde_json::Value,
    pub photo_required: bool,
    pub workflow_rules: serde_json::Value,
    pub is_active: bool,
    pub version: i32,
    pub supersedes_id: Option<DbId>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<TemplateRow> for Template {
    type Error = CoreError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(Template {
            id: row.id,
            organization_id: row.organization_id,
            definition: TemplateDefinition {
                name: row.name,
                description: row.description,
                button_type: parse_column(&row.button_type, "button_type")?,
                triggering_department: TriggeringDepartment::from(row.triggering_department),
                assigned_departments: row.assigned_departments,
                form_fields: decode_json(row.form_fields, "form_fields")?,
                photo_required: row.photo_required,
                workflow_rules: decode_json(row.workflow_rules, "workflow_rules")?,
                is_active: row.is_active,
            },
            version: row.version,
            supersedes_id: row.supersedes_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insert DTO for a template version.
#[derive(Debug, Clone)]
pub struct CreateTemplate<'a> {
    pub organization_id: DbId,
    pub definition: &'a TemplateDefinition,
    pub version: i32,
    pub supersedes_id: Option<DbId>,
    pub created_by: Option<DbId>,
}

/// List filter for templates. `None` fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct TemplateListParams {
    pub active_only: bool,
    /// Matches templates triggered by this department or by `any`.
    pub triggering_department: Option<String>,
    pub button_type: Option<String>,
}
