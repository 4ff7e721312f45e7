//! Rule dispatch ledger entries and cross-record form links.

use serde::{Deserialize, Serialize};

use crate::rules::RuleAction;
use crate::types::{DbId, Timestamp};

/// `source_type` sent to the CMMS when a rule creates a work order.
pub const WORK_ORDER_SOURCE_TYPE: &str = "task_feed_post";

/// Form link type for work orders created by rules.
pub const FORM_TYPE_WORK_ORDER: &str = "work_order";

/// State of one fired rule's side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Claimed, side effect in flight.
    Pending,
    /// External side effect succeeded.
    Dispatched,
    /// Rule has no external effect; firing was recorded.
    Recorded,
    /// External side effect failed; eligible for retry.
    Failed,
}

impl DispatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::Dispatched => "dispatched",
            DispatchStatus::Recorded => "recorded",
            DispatchStatus::Failed => "failed",
        }
    }

    /// Whether a later evaluation may dispatch again.
    pub fn is_retryable(self) -> bool {
        self == DispatchStatus::Failed
    }
}

impl std::str::FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DispatchStatus::Pending),
            "dispatched" => Ok(DispatchStatus::Dispatched),
            "recorded" => Ok(DispatchStatus::Recorded),
            "failed" => Ok(DispatchStatus::Failed),
            other => Err(format!("Unknown dispatch status '{other}'")),
        }
    }
}

/// Ledger row keyed by (post, rule index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDispatch {
    pub id: DbId,
    pub post_id: DbId,
    pub rule_index: i32,
    pub action: RuleAction,
    pub status: DispatchStatus,
    pub external_ref: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Result of trying to claim a ledger entry before dispatching.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchClaim {
    /// The caller owns the dispatch and must mark it dispatched or failed.
    Claimed { attempt: i32 },
    /// A previous evaluation already handled this rule.
    AlreadyHandled(RuleDispatch),
}

/// Cross-reference from a post to another business record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormLink {
    pub id: DbId,
    pub organization_id: DbId,
    pub post_id: DbId,
    pub department_task_id: Option<DbId>,
    pub form_type: String,
    pub form_id: String,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
}

/// A reference supplied when completing a task, e.g. the inspection form
/// that closed it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedReference {
    pub form_type: String,
    pub form_id: String,
}
