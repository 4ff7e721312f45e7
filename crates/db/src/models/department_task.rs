//! Department task row model.

use sqlx::FromRow;
use taskfeed_core::error::CoreError;
use taskfeed_core::task::{DepartmentTask, DepartmentTaskStatus};
use taskfeed_core::types::{DbId, Timestamp};

use super::parse_column;

/// A row from the `task_feed_department_tasks` table.
#[derive(Debug, Clone, FromRow)]
pub struct DepartmentTaskRow {
    pub id: DbId,
    pub organization_id: DbId,
    pub post_id: DbId,
    pub department_code: String,
    pub status: String,
    pub started_at: Option<Timestamp>,
    pub completed_by_id: Option<DbId>,
    pub completed_at: Option<Timestamp>,
    pub completion_notes: Option<String>,
    pub skip_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<DepartmentTaskRow> for DepartmentTask {
    type Error = CoreError;

    fn try_from(row: DepartmentTaskRow) -> Result<Self, Self::Error> {
        Ok(DepartmentTask {
            id: row.id,
            organization_id: row.organization_id,
            post_id: row.post_id,
            department_code: row.department_code,
            status: parse_column::<DepartmentTaskStatus>(&row.status, "status")?,
            started_at: row.started_at,
            completed_by_id: row.completed_by_id,
            completed_at: row.completed_at,
            completion_notes: row.completion_notes,
            skip_reason: row.skip_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
