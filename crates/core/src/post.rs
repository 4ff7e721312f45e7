//! Posts and the department-task rollup.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, FieldViolation};
use crate::form::{FormData, PHOTO_FIELD, VIOLATION_INVALID_TYPE, VIOLATION_REQUIRED};
use crate::task::{DepartmentTask, DepartmentTaskStatus};
use crate::template::Template;
use crate::types::{DbId, Timestamp};

/// Prefix of human-readable post numbers.
pub const POST_NUMBER_PREFIX: &str = "TF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    RequiresFollowup,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::InProgress => "in_progress",
            PostStatus::Completed => "completed",
            PostStatus::Cancelled => "cancelled",
            PostStatus::RequiresFollowup => "requires_followup",
        }
    }

    /// Operator overrides that the rollup never overwrites.
    pub fn is_override(self) -> bool {
        matches!(self, PostStatus::Cancelled | PostStatus::RequiresFollowup)
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PostStatus::Pending),
            "in_progress" => Ok(PostStatus::InProgress),
            "completed" => Ok(PostStatus::Completed),
            "cancelled" => Ok(PostStatus::Cancelled),
            "requires_followup" => Ok(PostStatus::RequiresFollowup),
            other => Err(format!("Unknown post status '{other}'")),
        }
    }
}

/// One fan-out instance of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: DbId,
    pub organization_id: DbId,
    pub post_number: String,
    pub template_id: DbId,
    /// Frozen copy of the template at creation time.
    pub template_snapshot: Template,
    pub form_data: serde_json::Value,
    pub status: PostStatus,
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

impl Post {
    /// Typed form values, re-read against the snapshot schema.
    pub fn form_values(&self) -> FormData {
        FormData::from_stored(&self.template_snapshot.definition.form_fields, &self.form_data)
    }

    /// Department tasks of a cancelled post are frozen.
    pub fn ensure_accepts_task_updates(&self) -> Result<(), CoreError> {
        if self.status == PostStatus::Cancelled {
            return Err(CoreError::Conflict(format!(
                "Post {} is cancelled",
                self.post_number
            )));
        }
        Ok(())
    }

    pub fn ensure_can_cancel(&self) -> Result<(), CoreError> {
        match self.status {
            PostStatus::Cancelled => Err(CoreError::Conflict(format!(
                "Post {} is already cancelled",
                self.post_number
            ))),
            PostStatus::Completed => Err(CoreError::Conflict(format!(
                "Post {} is completed and cannot be cancelled",
                self.post_number
            ))),
            _ => Ok(()),
        }
    }

    pub fn ensure_can_flag_followup(&self) -> Result<(), CoreError> {
        if self.status == PostStatus::Cancelled {
            return Err(CoreError::Conflict(format!(
                "Post {} is cancelled",
                self.post_number
            )));
        }
        Ok(())
    }

    pub fn ensure_requires_followup(&self) -> Result<(), CoreError> {
        if self.status != PostStatus::RequiresFollowup {
            return Err(CoreError::Conflict(format!(
                "Post {} is not flagged for follow-up",
                self.post_number
            )));
        }
        Ok(())
    }
}

/// Submission metadata accompanying the form data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMetadata {
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub source_department: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PostMetadata {
    pub fn has_photo(&self) -> bool {
        self.photo_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

/// Check a submission against the template snapshot.
///
/// Collects every violation: form field coercion and option membership, plus
/// the photo requirement. Returns the typed form data on success.
pub fn validate_submission(
    template: &Template,
    raw: &serde_json::Value,
    metadata: &PostMetadata,
) -> Result<FormData, CoreError> {
    let empty = serde_json::Map::new();
    let mut violations = Vec::new();

    let object = match raw {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => &empty,
        _ => {
            violations.push(FieldViolation::new(
                "form_data",
                VIOLATION_INVALID_TYPE,
                "Form data must be a JSON object",
            ));
            &empty
        }
    };

    let data = match FormData::parse(&template.definition.form_fields, object) {
        Ok(data) => Some(data),
        Err(field_violations) => {
            violations.extend(field_violations);
            None
        }
    };

    if template.definition.photo_required && !metadata.has_photo() {
        violations.push(FieldViolation::new(
            PHOTO_FIELD,
            VIOLATION_REQUIRED,
            "A photo is required for this template",
        ));
    }

    match data {
        Some(data) if violations.is_empty() => Ok(data),
        _ => Err(CoreError::FormValidation(violations)),
    }
}

/// Format the organization sequence value as a post number, e.g. `TF-000042`.
pub fn format_post_number(sequence: i64) -> String {
    format!("{POST_NUMBER_PREFIX}-{sequence:06}")
}

/// Derive a post status from its task statuses.
///
/// - `completed` iff every non-skipped task is completed (a post whose tasks
///   were all skipped is therefore completed);
/// - `in_progress` iff some task is completed or in progress;
/// - `pending` otherwise.
pub fn derive_rollup(statuses: &[DepartmentTaskStatus]) -> PostStatus {
    if statuses.is_empty() {
        return PostStatus::Pending;
    }

    let all_done = statuses
        .iter()
        .filter(|s| **s != DepartmentTaskStatus::Skipped)
        .all(|s| *s == DepartmentTaskStatus::Completed);
    if all_done {
        return PostStatus::Completed;
    }

    let any_started = statuses.iter().any(|s| {
        matches!(
            s,
            DepartmentTaskStatus::Completed | DepartmentTaskStatus::InProgress
        )
    });
    if any_started {
        PostStatus::InProgress
    } else {
        PostStatus::Pending
    }
}

/// The outcome of recomputing a post's rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupUpdate {
    pub status: PostStatus,
    pub completed_at: Option<Timestamp>,
}

/// Recompute `post`'s status from the full current task set.
///
/// Overrides (`cancelled`, `requires_followup`) are preserved. `completed_at`
/// is set only on the transition into `completed`.
pub fn recompute_rollup(post: &Post, tasks: &[DepartmentTask], now: Timestamp) -> RollupUpdate {
    if post.status.is_override() {
        return RollupUpdate {
            status: post.status,
            completed_at: post.completed_at,
        };
    }

    let statuses: Vec<_> = tasks.iter().map(|t| t.status).collect();
    let status = derive_rollup(&statuses);
    let completed_at = match (post.status, status) {
        (PostStatus::Completed, PostStatus::Completed) => post.completed_at,
        (_, PostStatus::Completed) => Some(now),
        _ => None,
    };
    RollupUpdate {
        status,
        completed_at,
    }
}

/// Re-derive the rollup for a post leaving `requires_followup`.
///
/// A post that had completed before being flagged keeps its original
/// `completed_at` if its tasks still roll up to completed.
pub fn rollup_after_followup(post: &Post, tasks: &[DepartmentTask], now: Timestamp) -> RollupUpdate {
    let mut base = post.clone();
    base.status = if post.completed_at.is_some() {
        PostStatus::Completed
    } else {
        PostStatus::Pending
    };
    recompute_rollup(&base, tasks, now)
}
