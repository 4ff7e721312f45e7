//! Repository for the `task_feed_posts` and `task_feed_post_sequences` tables.

use sqlx::PgExecutor;
use taskfeed_core::types::{DbId, Timestamp};

use crate::models::post::{CreatePost, PostListParams, PostRow};

/// Column list for task_feed_posts queries.
const COLUMNS: &str = "id, organization_id, post_number, template_id, template_snapshot, \
    form_data, status, assigned_departments, photo_url, source_department, notes, \
    created_by, created_at, updated_at, completed_at, cancelled_at, cancel_reason, \
    followup_reason";

/// Provides persistence for posts.
pub struct PostRepo;

impl PostRepo {
    /// Advance the organization's post sequence and return the new value.
    ///
    /// The upsert holds the sequence row lock until the surrounding
    /// transaction ends, so numbers are never handed out twice.
    pub async fn next_sequence<'e, E>(executor: E, organization_id: DbId) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO task_feed_post_sequences (organization_id, last_value)
             VALUES ($1, 1)
             ON CONFLICT (organization_id)
             DO UPDATE SET last_value = task_feed_post_sequences.last_value + 1
             RETURNING last_value",
        )
        .bind(organization_id)
        .fetch_one(executor)
        .await
    }

    /// Insert a new post in `pending` status, returning the created row.
    pub async fn create<'e, E>(executor: E, input: &CreatePost) -> Result<PostRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO task_feed_posts
                (organization_id, post_number, template_id, template_snapshot, form_data,
                 assigned_departments, photo_url, source_department, notes, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(input.organization_id)
            .bind(&input.post_number)
            .bind(input.template_id)
            .bind(&input.template_snapshot)
            .bind(&input.form_data)
            .bind(&input.assigned_departments)
            .bind(&input.photo_url)
            .bind(&input.source_department)
            .bind(&input.notes)
            .bind(input.created_by)
            .fetch_one(executor)
            .await
    }

    /// Find a post by ID within an organization.
    pub async fn find_by_id<'e, E>(
        executor: E,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<PostRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_posts WHERE organization_id = $1 AND id = $2"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(organization_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find a post and lock its row until the transaction ends.
    pub async fn lock<'e, E>(
        executor: E,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<PostRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_posts
             WHERE organization_id = $1 AND id = $2
             FOR UPDATE"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(organization_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List posts for an organization, newest first.
    pub async fn list<'e, E>(
        executor: E,
        organization_id: DbId,
        params: &PostListParams,
    ) -> Result<Vec<PostRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_posts
             WHERE organization_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::bigint IS NULL OR template_id = $3)
               AND ($4::text IS NULL OR $4 = ANY(assigned_departments))
             ORDER BY created_at DESC, id DESC
             LIMIT $5 OFFSET $6"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(organization_id)
            .bind(&params.status)
            .bind(params.template_id)
            .bind(&params.department_code)
            .bind(params.limit)
            .bind(params.offset)
            .fetch_all(executor)
            .await
    }

    /// Number of posts created from a template.
    pub async fn count_for_template<'e, E>(executor: E, template_id: DbId) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM task_feed_posts WHERE template_id = $1")
            .bind(template_id)
            .fetch_one(executor)
            .await
    }

    /// Persist a recomputed rollup.
    pub async fn update_rollup<'e, E>(
        executor: E,
        id: DbId,
        status: &str,
        completed_at: Option<Timestamp>,
    ) -> Result<PostRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_posts
             SET status = $2, completed_at = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(id)
            .bind(status)
            .bind(completed_at)
            .fetch_one(executor)
            .await
    }

    /// Move a post to `cancelled`.
    pub async fn mark_cancelled<'e, E>(
        executor: E,
        id: DbId,
        reason: &str,
    ) -> Result<PostRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_posts
             SET status = 'cancelled', cancelled_at = NOW(), cancel_reason = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(id)
            .bind(reason)
            .fetch_one(executor)
            .await
    }

    /// Move a post to `requires_followup`.
    pub async fn mark_followup<'e, E>(
        executor: E,
        id: DbId,
        reason: &str,
    ) -> Result<PostRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_posts
             SET status = 'requires_followup', followup_reason = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(id)
            .bind(reason)
            .fetch_one(executor)
            .await
    }

    /// Drop the follow-up override and store the re-derived rollup.
    pub async fn clear_followup<'e, E>(
        executor: E,
        id: DbId,
        status: &str,
        completed_at: Option<Timestamp>,
    ) -> Result<PostRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_posts
             SET status = $2, completed_at = $3, followup_reason = NULL, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PostRow>(&query)
            .bind(id)
            .bind(status)
            .bind(completed_at)
            .fetch_one(executor)
            .await
    }
}
