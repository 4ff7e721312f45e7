//! Form link row model.

use sqlx::FromRow;
use taskfeed_core::dispatch::FormLink;
use taskfeed_core::types::{DbId, Timestamp};

/// A row from the `task_feed_form_links` table.
#[derive(Debug, Clone, FromRow)]
pub struct FormLinkRow {
    pub id: DbId,
    pub organization_id: DbId,
    pub post_id: DbId,
    pub department_task_id: Option<DbId>,
    pub form_type: String,
    pub form_id: String,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
}

impl From<FormLinkRow> for FormLink {
    fn from(row: FormLinkRow) -> Self {
        FormLink {
            id: row.id,
            organization_id: row.organization_id,
            post_id: row.post_id,
            department_task_id: row.department_task_id,
            form_type: row.form_type,
            form_id: row.form_id,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

/// Insert DTO for a form link.
#[derive(Debug, Clone)]
pub struct CreateFormLink {
    pub organization_id: DbId,
    pub post_id: DbId,
    pub department_task_id: Option<DbId>,
    pub form_type: String,
    pub form_id: String,
    pub created_by: Option<DbId>,
}
