use serde::{Deserialize, Serialize};

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Template schema violations, raised at authoring time.
    #[error("Template validation failed: {}", summarize(.0))]
    TemplateValidation(Vec<FieldViolation>),

    /// Submitted form data does not satisfy the template snapshot.
    #[error("Form validation failed: {}", summarize(.0))]
    FormValidation(Vec<FieldViolation>),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Department task {task_id} is already completed")]
    AlreadyCompleted { task_id: DbId },

    /// The persisted task set of a post does not match its assigned
    /// departments. Not retryable; requires manual reconciliation.
    #[error("Partial fan-out for post {post_id}: expected {expected} department tasks, found {actual}")]
    PartialFanOut {
        post_id: DbId,
        expected: usize,
        actual: usize,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The violation list carried by validation variants, if any.
    pub fn violations(&self) -> Option<&[FieldViolation]> {
        match self {
            CoreError::TemplateValidation(v) | CoreError::FormValidation(v) => Some(v),
            _ => None,
        }
    }
}

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_violation() {
        let err = CoreError::FormValidation(vec![
            FieldViolation::new("severity", "required", "Severity is required"),
            FieldViolation::new("equipment", "required", "Equipment is required"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("severity: Severity is required"));
        assert!(msg.contains("equipment: Equipment is required"));
        assert_eq!(err.violations().map(|v| v.len()), Some(2));
    }

    #[test]
    fn non_validation_errors_have_no_violations() {
        let err = CoreError::AlreadyCompleted { task_id: 3 };
        assert!(err.violations().is_none());
    }
}
