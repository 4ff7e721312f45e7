//! Repository for the `task_feed_department_tasks` table.

use sqlx::PgExecutor;
use taskfeed_core::task::DepartmentTask;
use taskfeed_core::types::DbId;

use crate::models::department_task::DepartmentTaskRow;

/// Column list for task_feed_department_tasks queries.
const COLUMNS: &str = "id, organization_id, post_id, department_code, status, started_at, \
    completed_by_id, completed_at, completion_notes, skip_reason, created_at, updated_at";

/// Provides persistence for department tasks.
pub struct DepartmentTaskRepo;

impl DepartmentTaskRepo {
    /// Insert one pending task per department code, in the given order.
    pub async fn create_many<'e, E>(
        executor: E,
        organization_id: DbId,
        post_id: DbId,
        department_codes: &[String],
    ) -> Result<Vec<DepartmentTaskRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO task_feed_department_tasks (organization_id, post_id, department_code)
             SELECT $1, $2, d.code
             FROM UNNEST($3::text[]) WITH ORDINALITY AS d(code, ord)
             ORDER BY d.ord
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DepartmentTaskRow>(&query)
            .bind(organization_id)
            .bind(post_id)
            .bind(department_codes)
            .fetch_all(executor)
            .await
    }

    /// All tasks of a post, in creation order.
    pub async fn list_for_post<'e, E>(
        executor: E,
        post_id: DbId,
    ) -> Result<Vec<DepartmentTaskRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_department_tasks
             WHERE post_id = $1
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, DepartmentTaskRow>(&query)
            .bind(post_id)
            .fetch_all(executor)
            .await
    }

    /// Find a task by ID within an organization.
    pub async fn find_by_id<'e, E>(
        executor: E,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<DepartmentTaskRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_department_tasks
             WHERE organization_id = $1 AND id = $2"
        );
        sqlx::query_as::<_, DepartmentTaskRow>(&query)
            .bind(organization_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find a task and lock its row until the transaction ends.
    ///
    /// Callers lock the parent post first so concurrent transitions on
    /// sibling tasks serialize on the post.
    pub async fn lock<'e, E>(
        executor: E,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<DepartmentTaskRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_department_tasks
             WHERE organization_id = $1 AND id = $2
             FOR UPDATE"
        );
        sqlx::query_as::<_, DepartmentTaskRow>(&query)
            .bind(organization_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Write back the mutable state of a task.
    pub async fn update_state<'e, E>(
        executor: E,
        task: &DepartmentTask,
    ) -> Result<DepartmentTaskRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_department_tasks SET
                status = $2,
                started_at = $3,
                completed_by_id = $4,
                completed_at = $5,
                completion_notes = $6,
                skip_reason = $7,
                updated_at = $8
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DepartmentTaskRow>(&query)
            .bind(task.id)
            .bind(task.status.as_str())
            .bind(task.started_at)
            .bind(task.completed_by_id)
            .bind(task.completed_at)
            .bind(&task.completion_notes)
            .bind(&task.skip_reason)
            .bind(task.updated_at)
            .fetch_one(executor)
            .await
    }

    /// Skip every non-terminal task of a post, returning the updated rows.
    pub async fn skip_open_for_post<'e, E>(
        executor: E,
        post_id: DbId,
        reason: &str,
    ) -> Result<Vec<DepartmentTaskRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_department_tasks
             SET status = 'skipped', skip_reason = $2, updated_at = NOW()
             WHERE post_id = $1 AND status IN ('pending', 'in_progress')
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DepartmentTaskRow>(&query)
            .bind(post_id)
            .bind(reason)
            .fetch_all(executor)
            .await
    }

    /// Tasks assigned to a department, newest first.
    pub async fn list_for_department<'e, E>(
        executor: E,
        organization_id: DbId,
        department_code: &str,
        open_only: bool,
    ) -> Result<Vec<DepartmentTaskRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_department_tasks
             WHERE organization_id = $1
               AND department_code = $2
               AND ($3 = false OR status IN ('pending', 'in_progress'))
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, DepartmentTaskRow>(&query)
            .bind(organization_id)
            .bind(department_code)
            .bind(open_only)
            .fetch_all(executor)
            .await
    }
}
