//! Repository for the `task_feed_rule_dispatches` ledger.

use sqlx::PgExecutor;
use taskfeed_core::types::DbId;

use crate::models::rule_dispatch::RuleDispatchRow;

const COLUMNS: &str = "id, post_id, rule_index, action, status, external_ref, error, \
    attempts, created_at, updated_at";

/// Provides the claim/finish protocol for rule side effects.
pub struct RuleDispatchRepo;

impl RuleDispatchRepo {
    /// Claim the ledger entry for (post, rule) in `pending` state.
    ///
    /// Succeeds when no entry exists yet or the previous attempt `failed`
    /// (bumping `attempts`). Returns `None` when the entry is pending,
    /// dispatched or recorded; the caller must not dispatch in that case.
    pub async fn try_claim<'e, E>(
        executor: E,
        post_id: DbId,
        rule_index: i32,
        action: &str,
    ) -> Result<Option<RuleDispatchRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO task_feed_rule_dispatches (post_id, rule_index, action, status, attempts)
             VALUES ($1, $2, $3, 'pending', 1)
             ON CONFLICT (post_id, rule_index) DO UPDATE
                SET status = 'pending',
                    attempts = task_feed_rule_dispatches.attempts + 1,
                    error = NULL,
                    updated_at = NOW()
                WHERE task_feed_rule_dispatches.status = 'failed'
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RuleDispatchRow>(&query)
            .bind(post_id)
            .bind(rule_index)
            .bind(action)
            .fetch_optional(executor)
            .await
    }

    /// Find the ledger entry for (post, rule).
    pub async fn find<'e, E>(
        executor: E,
        post_id: DbId,
        rule_index: i32,
    ) -> Result<Option<RuleDispatchRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_rule_dispatches
             WHERE post_id = $1 AND rule_index = $2"
        );
        sqlx::query_as::<_, RuleDispatchRow>(&query)
            .bind(post_id)
            .bind(rule_index)
            .fetch_optional(executor)
            .await
    }

    /// Record the result of a claimed dispatch.
    pub async fn finish<'e, E>(
        executor: E,
        post_id: DbId,
        rule_index: i32,
        status: &str,
        external_ref: Option<&str>,
        error: Option<&str>,
    ) -> Result<RuleDispatchRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_rule_dispatches
             SET status = $3, external_ref = $4, error = $5, updated_at = NOW()
             WHERE post_id = $1 AND rule_index = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RuleDispatchRow>(&query)
            .bind(post_id)
            .bind(rule_index)
            .bind(status)
            .bind(external_ref)
            .bind(error)
            .fetch_one(executor)
            .await
    }

    /// The ledger of a post, ordered by rule index.
    pub async fn list_for_post<'e, E>(
        executor: E,
        post_id: DbId,
    ) -> Result<Vec<RuleDispatchRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_rule_dispatches
             WHERE post_id = $1
             ORDER BY rule_index ASC"
        );
        sqlx::query_as::<_, RuleDispatchRow>(&query)
            .bind(post_id)
            .fetch_all(executor)
            .await
    }
}
