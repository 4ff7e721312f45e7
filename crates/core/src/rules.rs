//! Workflow rule types and the pure rule evaluator.
//!
//! Evaluation depends only on the rules and the typed form data; side effects
//! are dispatched by the workflow engine from the returned decisions.

use serde::{Deserialize, Serialize};

use crate::form::{parse_date, FormData, FormValue};
use crate::types::DbId;

/// Comparison applied between a field value and a condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    NotEquals,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field_id: String,
    pub operator: RuleOperator,
    pub value: String,
}

/// What happens when a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Notify,
    CreateWorkOrder,
    AlertPersonnel,
    StoreOnly,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::Notify => "notify",
            RuleAction::CreateWorkOrder => "create_work_order",
            RuleAction::AlertPersonnel => "alert_personnel",
            RuleAction::StoreOnly => "store_only",
        }
    }

    /// Whether firing calls an external collaborator.
    pub fn has_external_effect(self) -> bool {
        matches!(self, RuleAction::CreateWorkOrder | RuleAction::AlertPersonnel)
    }
}

impl std::str::FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notify" => Ok(RuleAction::Notify),
            "create_work_order" => Ok(RuleAction::CreateWorkOrder),
            "alert_personnel" => Ok(RuleAction::AlertPersonnel),
            "store_only" => Ok(RuleAction::StoreOnly),
            other => Err(format!("Unknown rule action '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl WorkOrderPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkOrderPriority::Low => "low",
            WorkOrderPriority::Medium => "medium",
            WorkOrderPriority::High => "high",
            WorkOrderPriority::Critical => "critical",
        }
    }
}

/// A condition/action pair evaluated at post-creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RuleCondition>,
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_work_order_priority: Option<WorkOrderPriority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_personnel_ids: Vec<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkflowRule {
    pub fn unconditional(action: RuleAction) -> Self {
        Self {
            condition: None,
            action,
            create_work_order_priority: None,
            alert_personnel_ids: Vec::new(),
            message: None,
        }
    }

    pub fn when(mut self, field_id: &str, operator: RuleOperator, value: &str) -> Self {
        self.condition = Some(RuleCondition {
            field_id: field_id.to_string(),
            operator,
            value: value.to_string(),
        });
        self
    }

    pub fn work_order_priority(&self) -> WorkOrderPriority {
        self.create_work_order_priority.unwrap_or_default()
    }

    /// Whether this rule fires for `data`.
    pub fn matches(&self, data: &FormData) -> bool {
        match &self.condition {
            None => true,
            Some(condition) => condition_matches(condition, data),
        }
    }
}

/// The firing decision for one rule, in list order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDecision {
    pub rule_index: usize,
    pub action: RuleAction,
    pub fired: bool,
}

/// Evaluate every rule against `data`, preserving list order.
pub fn evaluate_rules(rules: &[WorkflowRule], data: &FormData) -> Vec<RuleDecision> {
    rules
        .iter()
        .enumerate()
        .map(|(rule_index, rule)| RuleDecision {
            rule_index,
            action: rule.action,
            fired: rule.matches(data),
        })
        .collect()
}

fn condition_matches(condition: &RuleCondition, data: &FormData) -> bool {
    let value = data.get(&condition.field_id);
    match condition.operator {
        RuleOperator::Equals => value.is_some_and(|v| value_equals(v, &condition.value)),
        RuleOperator::NotEquals => !value.is_some_and(|v| value_equals(v, &condition.value)),
        RuleOperator::Contains => value.is_some_and(|v| value_contains(v, &condition.value)),
    }
}

fn value_equals(value: &FormValue, expected: &str) -> bool {
    match value {
        FormValue::Text(s) | FormValue::Choice(s) => s == expected,
        FormValue::Choices(items) => items.len() == 1 && items[0] == expected,
        FormValue::Number(n) => expected
            .trim()
            .parse::<f64>()
            .is_ok_and(|e| (e - n).abs() < f64::EPSILON),
        FormValue::Date(d) => parse_date(expected).is_some_and(|e| e == *d),
    }
}

fn value_contains(value: &FormValue, needle: &str) -> bool {
    match value {
        FormValue::Text(s) | FormValue::Choice(s) => s.contains(needle),
        FormValue::Choices(items) => items.iter().any(|item| item == needle),
        FormValue::Number(_) | FormValue::Date(_) => value.canonical_string().contains(needle),
    }
}
