//! Post row model.

use sqlx::FromRow;
use taskfeed_core::error::CoreError;
use taskfeed_core::post::{Post, PostStatus};
use taskfeed_core::types::{DbId, Timestamp};

use super::{decode_json, parse_column};

/// A row from the `task_feed_posts` table.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: DbId,
    pub organization_id: DbId,
    pub post_number: String,
    pub template_id: DbId,
    pub template_snapshot: serde_json::Value,
    pub form_data: serde_json::Value,
    pub status: String,
    pub assigned_departments: Vec<String>,
    pub photo_url: Option<String>,
    pub source_department: Option<String>,
    pub notes: Option<String>,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub cancel_reason: Option<String>,
    pub followup_reason: Option<String>,
}

impl TryFrom<PostRow> for Post {
    type Error = CoreError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Post {
            id: row.id,
            organization_id: row.organization_id,
            post_number: row.post_number,
            template_id: row.template_id,
            template_snapshot: decode_json(row.template_snapshot, "template_snapshot")?,
            form_data: row.form_data,
            status: parse_column::<PostStatus>(&row.status, "status")?,
            assigned_departments: row.assigned_departments,
            photo_url: row.photo_url,
            source_department: row.source_department,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            cancel_reason: row.cancel_reason,
            followup_reason: row.followup_reason,
        })
    }
}

/// Insert DTO for a post.
#[derive(Debug, Clone)]
pub struct CreatePost {
    pub organization_id: DbId,
    pub post_number: String,
    pub template_id: DbId,
    pub template_snapshot: serde_json::Value,
    pub form_data: serde_json::Value,
    pub assigned_departments: Vec<String>,
    pub photo_url: Option<String>,
    pub source_department: Option<String>,
    pub notes: Option<String>,
    pub created_by: DbId,
}

/// List filter for posts. `None` fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct PostListParams {
    pub status: Option<String>,
    pub template_id: Option<DbId>,
    pub department_code: Option<String>,
    pub limit: i64,
    pub offset: i64,
}
