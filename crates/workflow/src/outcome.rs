//! Result types returned by [`TaskFeedService`](crate::TaskFeedService).

use serde::{Serialize, Serializer};
use taskfeed_core::dispatch::{DispatchStatus, FormLink, RuleDispatch};
use taskfeed_core::post::Post;
use taskfeed_core::rules::{RuleAction, RuleDecision};
use taskfeed_core::task::DepartmentTask;

use crate::error::DispatchError;

/// What happened to one rule during an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule_index: usize,
    pub action: RuleAction,
    pub fired: bool,
    /// Ledger state after this evaluation. `None` when the rule did not fire
    /// or the ledger was unavailable.
    pub dispatch_status: Option<DispatchStatus>,
    /// Id of the record created by the side effect, e.g. a work order.
    pub external_ref: Option<String>,
    /// A previous evaluation already handled this rule; nothing was sent.
    pub already_handled: bool,
    #[serde(serialize_with = "serialize_warning")]
    pub warning: Option<DispatchError>,
}

impl RuleOutcome {
    pub(crate) fn not_fired(decision: &RuleDecision) -> Self {
        Self {
            rule_index: decision.rule_index,
            action: decision.action,
            fired: false,
            dispatch_status: None,
            external_ref: None,
            already_handled: false,
            warning: None,
        }
    }

    pub(crate) fn already_handled(decision: &RuleDecision, entry: &RuleDispatch) -> Self {
        Self {
            rule_index: decision.rule_index,
            action: decision.action,
            fired: true,
            dispatch_status: Some(entry.status),
            external_ref: entry.external_ref.clone(),
            already_handled: true,
            warning: None,
        }
    }

    pub(crate) fn dispatched(
        decision: &RuleDecision,
        status: DispatchStatus,
        external_ref: Option<String>,
        warning: Option<DispatchError>,
    ) -> Self {
        Self {
            rule_index: decision.rule_index,
            action: decision.action,
            fired: true,
            dispatch_status: Some(status),
            external_ref,
            already_handled: false,
            warning,
        }
    }

    /// The ledger could not be claimed, so nothing was sent.
    pub(crate) fn unclaimed(decision: &RuleDecision, warning: DispatchError) -> Self {
        Self {
            rule_index: decision.rule_index,
            action: decision.action,
            fired: true,
            dispatch_status: None,
            external_ref: None,
            already_handled: false,
            warning: Some(warning),
        }
    }

    /// Whether this evaluation actually called an external collaborator
    /// successfully.
    pub fn sent(&self) -> bool {
        !self.already_handled && self.dispatch_status == Some(DispatchStatus::Dispatched)
    }
}

fn serialize_warning<S>(warning: &Option<DispatchError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match warning {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Result of `create_post`.
#[derive(Debug, Clone, Serialize)]
pub struct PostCreation {
    pub post: Post,
    pub tasks: Vec<DepartmentTask>,
    pub rule_outcomes: Vec<RuleOutcome>,
}

impl PostCreation {
    pub fn warnings(&self) -> impl Iterator<Item = &DispatchError> {
        self.rule_outcomes.iter().filter_map(|o| o.warning.as_ref())
    }
}

/// A post with everything attached to it.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub tasks: Vec<DepartmentTask>,
    pub form_links: Vec<FormLink>,
    pub rule_dispatches: Vec<RuleDispatch>,
}

/// One catalog template that could not be installed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedFailure {
    pub name: String,
    pub error: String,
}

/// Result of `seed_defaults`. Template names per bucket, catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<SeedFailure>,
}
