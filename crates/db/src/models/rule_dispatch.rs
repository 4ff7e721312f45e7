//! Rule dispatch ledger row model.

use sqlx::FromRow;
use taskfeed_core::dispatch::{DispatchStatus, RuleDispatch};
use taskfeed_core::error::CoreError;
use taskfeed_core::rules::RuleAction;
use taskfeed_core::types::{DbId, Timestamp};

use super::parse_column;

/// A row from the `task_feed_rule_dispatches` table.
#[derive(Debug, Clone, FromRow)]
pub struct RuleDispatchRow {
    pub id: DbId,
    pub post_id: DbId,
    pub rule_index: i32,
    pub action: String,
    pub status: String,
    pub external_ref: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<RuleDispatchRow> for RuleDispatch {
    type Error = CoreError;

    fn try_from(row: RuleDispatchRow) -> Result<Self, Self::Error> {
        Ok(RuleDispatch {
            id: row.id,
            post_id: row.post_id,
            rule_index: row.rule_index,
            action: parse_column::<RuleAction>(&row.action, "action")?,
            status: parse_column::<DispatchStatus>(&row.status, "status")?,
            external_ref: row.external_ref,
            error: row.error,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
