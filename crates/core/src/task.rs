//! Department task state machine.
//!
//! ```text
//! pending ──start──▶ in_progress
//!    │                  │
//!    ├──complete────────┴──complete──▶ completed
//!    └──skip────────────┴──skip──────▶ skipped
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartmentTaskStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl DepartmentTaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DepartmentTaskStatus::Pending => "pending",
            DepartmentTaskStatus::InProgress => "in_progress",
            DepartmentTaskStatus::Completed => "completed",
            DepartmentTaskStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DepartmentTaskStatus::Completed | DepartmentTaskStatus::Skipped
        )
    }
}

impl std::str::FromStr for DepartmentTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DepartmentTaskStatus::Pending),
            "in_progress" => Ok(DepartmentTaskStatus::InProgress),
            "completed" => Ok(DepartmentTaskStatus::Completed),
            "skipped" => Ok(DepartmentTaskStatus::Skipped),
            other => Err(format!("Unknown department task status '{other}'")),
        }
    }
}

/// One department's unit of work spawned by a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentTask {
    pub id: DbId,
    pub organization_id: DbId,
    pub post_id: DbId,
    pub department_code: String,
    pub status: DepartmentTaskStatus,
    pub started_at: Option<Timestamp>,
    pub completed_by_id: Option<DbId>,
    pub completed_at: Option<Timestamp>,
    pub completion_notes: Option<String>,
    pub skip_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A requested state change on a department task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCommand {
    Start,
    Complete { notes: Option<String> },
    Skip { reason: String },
}

impl TaskCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TaskCommand::Start => "start",
            TaskCommand::Complete { .. } => "complete",
            TaskCommand::Skip { .. } => "skip",
        }
    }
}

/// Apply `command` to `task`, returning the updated task.
///
/// Completing an already completed task fails with
/// [`CoreError::AlreadyCompleted`] and leaves `completed_at` untouched.
pub fn apply_command(
    task: &DepartmentTask,
    command: &TaskCommand,
    actor: DbId,
    now: Timestamp,
) -> Result<DepartmentTask, CoreError> {
    let mut next = task.clone();

    match (task.status, command) {
        (DepartmentTaskStatus::Completed, TaskCommand::Complete { .. }) => {
            return Err(CoreError::AlreadyCompleted { task_id: task.id });
        }
        (DepartmentTaskStatus::Skipped, _) => {
            return Err(CoreError::Conflict(format!(
                "Department task {} was skipped and cannot {}",
                task.id,
                command.name()
            )));
        }
        (DepartmentTaskStatus::Completed, _) => {
            return Err(CoreError::Conflict(format!(
                "Department task {} is completed and cannot {}",
                task.id,
                command.name()
            )));
        }
        (DepartmentTaskStatus::InProgress, TaskCommand::Start) => {
            return Err(CoreError::Conflict(format!(
                "Department task {} is already in progress",
                task.id
            )));
        }
        (DepartmentTaskStatus::Pending, TaskCommand::Start) => {
            next.status = DepartmentTaskStatus::InProgress;
            next.started_at = Some(now);
        }
        (_, TaskCommand::Complete { notes }) => {
            next.status = DepartmentTaskStatus::Completed;
            next.completed_by_id = Some(actor);
            next.completed_at = Some(now);
            next.completion_notes = notes.clone();
        }
        (_, TaskCommand::Skip { reason }) => {
            if reason.trim().is_empty() {
                return Err(CoreError::Validation(
                    "A reason is required to skip a department task".into(),
                ));
            }
            next.status = DepartmentTaskStatus::Skipped;
            next.skip_reason = Some(reason.clone());
        }
    }

    next.updated_at = now;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    fn task(status: DepartmentTaskStatus) -> DepartmentTask {
        let now = Utc::now();
        DepartmentTask {
            id: 7,
            organization_id: 1,
            post_id: 3,
            department_code: "1001".into(),
            status,
            started_at: None,
            completed_by_id: None,
            completed_at: None,
            completion_notes: None,
            skip_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn start_moves_pending_to_in_progress() {
        let now = Utc::now();
        let next = apply_command(&task(DepartmentTaskStatus::Pending), &TaskCommand::Start, 9, now)
            .unwrap();
        assert_eq!(next.status, DepartmentTaskStatus::InProgress);
        assert_eq!(next.started_at, Some(now));
    }

    #[test]
    fn complete_records_actor_and_time() {
        let now = Utc::now();
        let cmd = TaskCommand::Complete {
            notes: Some("replaced belt".into()),
        };
        let next = apply_command(&task(DepartmentTaskStatus::InProgress), &cmd, 9, now).unwrap();
        assert_eq!(next.status, DepartmentTaskStatus::Completed);
        assert_eq!(next.completed_by_id, Some(9));
        assert_eq!(next.completed_at, Some(now));
        assert_eq!(next.completion_notes.as_deref(), Some("replaced belt"));
    }

    #[test]
    fn completing_twice_fails_without_touching_timestamp() {
        let first = Utc::now();
        let done = apply_command(
            &task(DepartmentTaskStatus::Pending),
            &TaskCommand::Complete { notes: None },
            9,
            first,
        )
        .unwrap();
        let err = apply_command(
            &done,
            &TaskCommand::Complete { notes: None },
            10,
            first + Duration::minutes(5),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::AlreadyCompleted { task_id: 7 });
        assert_eq!(done.completed_at, Some(first));
    }

    #[test]
    fn skip_requires_reason() {
        let err = apply_command(
            &task(DepartmentTaskStatus::Pending),
            &TaskCommand::Skip { reason: "  ".into() },
            9,
            Utc::now(),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[test]
    fn skipped_task_cannot_be_completed() {
        let err = apply_command(
            &task(DepartmentTaskStatus::Skipped),
            &TaskCommand::Complete { notes: None },
            9,
            Utc::now(),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
    }

    #[test]
    fn completed_task_cannot_be_skipped() {
        let err = apply_command(
            &task(DepartmentTaskStatus::Completed),
            &TaskCommand::Skip {
                reason: "n/a".into(),
            },
            9,
            Utc::now(),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            DepartmentTaskStatus::Pending,
            DepartmentTaskStatus::InProgress,
            DepartmentTaskStatus::Completed,
            DepartmentTaskStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<DepartmentTaskStatus>(), Ok(status));
        }
    }
}
