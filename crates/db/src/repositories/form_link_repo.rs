//! Repository for the `task_feed_form_links` table.

use sqlx::PgExecutor;
use taskfeed_core::types::DbId;

use crate::models::form_link::{CreateFormLink, FormLinkRow};

const COLUMNS: &str =
    "id, organization_id, post_id, department_task_id, form_type, form_id, created_by, created_at";

/// Provides persistence for post form links.
pub struct FormLinkRepo;

impl FormLinkRepo {
    /// Insert a link. Linking the same record twice returns the existing row.
    pub async fn create<'e, E>(executor: E, input: &CreateFormLink) -> Result<FormLinkRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO task_feed_form_links
                (organization_id, post_id, department_task_id, form_type, form_id, created_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (post_id, form_type, form_id)
             DO UPDATE SET department_task_id =
                COALESCE(task_feed_form_links.department_task_id, EXCLUDED.department_task_id)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FormLinkRow>(&query)
            .bind(input.organization_id)
            .bind(input.post_id)
            .bind(input.department_task_id)
            .bind(&input.form_type)
            .bind(&input.form_id)
            .bind(input.created_by)
            .fetch_one(executor)
            .await
    }

    /// All links of a post, oldest first.
    pub async fn list_for_post<'e, E>(
        executor: E,
        post_id: DbId,
    ) -> Result<Vec<FormLinkRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_form_links WHERE post_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, FormLinkRow>(&query)
            .bind(post_id)
            .fetch_all(executor)
            .await
    }
}
