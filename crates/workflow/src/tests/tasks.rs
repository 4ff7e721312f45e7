use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use taskfeed_core::department::{DEPT_MAINTENANCE, DEPT_QUALITY};
use taskfeed_core::dispatch::LinkedReference;
use taskfeed_core::error::CoreError;
use taskfeed_core::post::PostStatus;
use taskfeed_core::seed::{TEMPLATE_EQUIPMENT_FAILURE, TEMPLATE_PRE_OP};
use taskfeed_core::task::DepartmentTaskStatus;
use taskfeed_core::types::TenantContext;

use super::{ctx, DenySkips, Harness};
use crate::error::WorkflowError;
use crate::outcome::PostCreation;
use crate::store::{NewFormLink, TaskFeedStore};

async fn equipment_post(h: &Harness) -> PostCreation {
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;
    h.post(&ctx(), &template, json!({"equipment": "Filler 3", "severity": "low"}))
        .await
}

async fn pre_op_post(h: &Harness) -> PostCreation {
    let template = h.seeded(&ctx(), TEMPLATE_PRE_OP).await;
    h.post(
        &ctx(),
        &template,
        json!({"line": "L2", "result": "pass", "inspection_date": "2024-06-03"}),
    )
    .await
}

#[tokio::test]
async fn completing_sole_task_completes_post() {
    let h = Harness::new();
    let created = equipment_post(&h).await;
    let task = &created.tasks[0];

    let transition = h
        .service
        .complete_task(&ctx(), task.id, Some("Replaced drive belt".into()), None)
        .await
        .unwrap();

    assert_eq!(transition.task.status, DepartmentTaskStatus::Completed);
    assert_eq!(transition.task.completed_by_id, Some(10));
    assert_eq!(transition.task.completion_notes.as_deref(), Some("Replaced drive belt"));
    assert_eq!(transition.previous_post_status, PostStatus::Pending);
    assert_eq!(transition.post.status, PostStatus::Completed);
    assert!(transition.post_status_changed());
    assert!(transition.post.completed_at.is_some());
}

#[tokio::test]
async fn rollup_follows_the_full_task_set() {
    let h = Harness::new();
    let created = pre_op_post(&h).await;
    let [first, second, third] = [&created.tasks[0], &created.tasks[1], &created.tasks[2]];

    let started = h.service.start_task(&ctx(), first.id).await.unwrap();
    assert_eq!(started.task.status, DepartmentTaskStatus::InProgress);
    assert!(started.task.started_at.is_some());
    assert_eq!(started.post.status, PostStatus::InProgress);

    let done = h
        .service
        .complete_task(&ctx(), first.id, None, None)
        .await
        .unwrap();
    assert_eq!(done.post.status, PostStatus::InProgress);
    assert_eq!(done.post.completed_at, None);

    h.service
        .skip_task(&ctx(), second.id, "Line idle, no sanitation needed")
        .await
        .unwrap();
    let last = h
        .service
        .complete_task(&ctx(), third.id, None, None)
        .await
        .unwrap();
    assert_eq!(last.previous_post_status, PostStatus::InProgress);
    assert_eq!(last.post.status, PostStatus::Completed);
    assert!(last.post.completed_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_completions_of_sibling_tasks_all_succeed() {
    let h = Harness::new();
    let created = pre_op_post(&h).await;

    let handles: Vec<_> = created
        .tasks
        .iter()
        .map(|task| {
            let service = h.service.clone();
            let task_id = task.id;
            tokio::spawn(async move { service.complete_task(&ctx(), task_id, None, None).await })
        })
        .collect();
    let mut transitions = Vec::new();
    for handle in handles {
        transitions.push(handle.await.unwrap().unwrap());
    }

    // Exactly one completion saw the last open task and closed the post.
    let closing: Vec<_> = transitions
        .iter()
        .filter(|t| t.post.status == PostStatus::Completed)
        .collect();
    assert_eq!(closing.len(), 1);
    assert!(closing[0].post_status_changed());

    let detail = h.service.get_post(&ctx(), created.post.id).await.unwrap();
    assert!(detail
        .tasks
        .iter()
        .all(|t| t.status == DepartmentTaskStatus::Completed));
    assert_eq!(detail.post.status, PostStatus::Completed);
    assert_eq!(detail.post.completed_at, closing[0].post.completed_at);
}

#[tokio::test]
async fn skipping_every_task_completes_post() {
    let h = Harness::new();
    let created = equipment_post(&h).await;

    let transition = h
        .service
        .skip_task(&ctx(), created.tasks[0].id, "Reported twice")
        .await
        .unwrap();
    assert_eq!(transition.task.skip_reason.as_deref(), Some("Reported twice"));
    assert_eq!(transition.post.status, PostStatus::Completed);
}

#[tokio::test]
async fn completing_twice_reports_already_completed() {
    let h = Harness::new();
    let created = equipment_post(&h).await;
    let task_id = created.tasks[0].id;

    let first = h
        .service
        .complete_task(&ctx(), task_id, None, None)
        .await
        .unwrap();
    let err = h
        .service
        .complete_task(&ctx(), task_id, None, None)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::AlreadyCompleted { .. }));

    let detail = h.service.get_post(&ctx(), created.post.id).await.unwrap();
    assert_eq!(detail.tasks[0].completed_at, first.task.completed_at);
    assert_eq!(detail.post.completed_at, first.post.completed_at);
}

#[tokio::test]
async fn skip_requires_a_reason() {
    let h = Harness::new();
    let created = equipment_post(&h).await;

    let err = h
        .service
        .skip_task(&ctx(), created.tasks[0].id, "   ")
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn skip_is_subject_to_the_permission_policy() {
    let mut h = Harness::new();
    h.service = h.service.clone().with_permissions(Arc::new(DenySkips));
    let created = equipment_post(&h).await;

    let err = h
        .service
        .skip_task(&ctx(), created.tasks[0].id, "Not ours")
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Forbidden(_)));

    let tasks = h
        .service
        .list_department_tasks(&ctx(), DEPT_MAINTENANCE, true)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, DepartmentTaskStatus::Pending);
}

#[tokio::test]
async fn linked_reference_is_stored_as_form_link() {
    let h = Harness::new();
    let created = pre_op_post(&h).await;
    let quality = created
        .tasks
        .iter()
        .find(|t| t.department_code == DEPT_QUALITY)
        .unwrap();

    let transition = h
        .service
        .complete_task(
            &ctx(),
            quality.id,
            None,
            Some(LinkedReference {
                form_type: "inspection".into(),
                form_id: "INS-88".into(),
            }),
        )
        .await
        .unwrap();

    let link = transition.form_link.unwrap();
    assert_eq!(link.department_task_id, Some(quality.id));
    assert_eq!(link.form_id, "INS-88");

    let detail = h.service.get_post(&ctx(), created.post.id).await.unwrap();
    assert_eq!(detail.form_links, vec![link]);
}

#[tokio::test]
async fn completing_with_known_reference_attaches_the_task() {
    let h = Harness::new();
    let created = pre_op_post(&h).await;
    let quality = created
        .tasks
        .iter()
        .find(|t| t.department_code == DEPT_QUALITY)
        .unwrap();

    let unattached = h
        .store
        .add_form_link(NewFormLink {
            organization_id: 1,
            post_id: created.post.id,
            department_task_id: None,
            form_type: "inspection".into(),
            form_id: "INS-88".into(),
            created_by: None,
        })
        .await
        .unwrap();

    let transition = h
        .service
        .complete_task(
            &ctx(),
            quality.id,
            None,
            Some(LinkedReference {
                form_type: "inspection".into(),
                form_id: "INS-88".into(),
            }),
        )
        .await
        .unwrap();

    let link = transition.form_link.unwrap();
    assert_eq!(link.id, unattached.id);
    assert_eq!(link.department_task_id, Some(quality.id));

    let links = h.store.list_form_links(created.post.id).await.unwrap();
    assert_eq!(links, vec![link]);
}

#[tokio::test]
async fn blank_linked_reference_is_rejected() {
    let h = Harness::new();
    let created = equipment_post(&h).await;

    let err = h
        .service
        .complete_task(
            &ctx(),
            created.tasks[0].id,
            None,
            Some(LinkedReference {
                form_type: "inspection".into(),
                form_id: " ".into(),
            }),
        )
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn cancelling_skips_open_tasks_and_freezes_post() {
    let h = Harness::new();
    let created = pre_op_post(&h).await;
    h.service
        .complete_task(&ctx(), created.tasks[0].id, None, None)
        .await
        .unwrap();

    let cancellation = h
        .service
        .cancel_post(&ctx(), created.post.id, "Line decommissioned")
        .await
        .unwrap();
    assert_eq!(cancellation.post.status, PostStatus::Cancelled);
    assert!(cancellation.post.cancelled_at.is_some());
    assert_eq!(cancellation.skipped_tasks.len(), 2);
    assert!(cancellation
        .skipped_tasks
        .iter()
        .all(|t| t.skip_reason.as_deref() == Some("Line decommissioned")));

    let err = h
        .service
        .complete_task(&ctx(), created.tasks[1].id, None, None)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Conflict(_)));

    let err = h
        .service
        .cancel_post(&ctx(), created.post.id, "again")
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Conflict(_)));
}

#[tokio::test]
async fn cancel_requires_a_reason() {
    let h = Harness::new();
    let created = equipment_post(&h).await;
    let err = h
        .service
        .cancel_post(&ctx(), created.post.id, "")
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn followup_overrides_rollup_until_cleared() {
    let h = Harness::new();
    let created = equipment_post(&h).await;

    let flagged = h
        .service
        .flag_followup(&ctx(), created.post.id, "Guard missing after repair")
        .await
        .unwrap();
    assert_eq!(flagged.status, PostStatus::RequiresFollowup);
    assert_eq!(flagged.followup_reason.as_deref(), Some("Guard missing after repair"));

    let transition = h
        .service
        .complete_task(&ctx(), created.tasks[0].id, None, None)
        .await
        .unwrap();
    assert_eq!(transition.post.status, PostStatus::RequiresFollowup);

    let cleared = h.service.clear_followup(&ctx(), created.post.id).await.unwrap();
    assert_eq!(cleared.status, PostStatus::Completed);
    assert!(cleared.completed_at.is_some());
    assert_eq!(cleared.followup_reason, None);

    let err = h
        .service
        .clear_followup(&ctx(), created.post.id)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Conflict(_)));
}

#[tokio::test]
async fn department_queue_lists_open_tasks() {
    let h = Harness::new();
    let first = equipment_post(&h).await;
    let second = equipment_post(&h).await;
    h.service
        .complete_task(&ctx(), first.tasks[0].id, None, None)
        .await
        .unwrap();

    let open = h
        .service
        .list_department_tasks(&ctx(), DEPT_MAINTENANCE, true)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second.tasks[0].id);

    let all = h
        .service
        .list_department_tasks(&ctx(), DEPT_MAINTENANCE, false)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn tasks_of_other_organizations_are_not_found() {
    let h = Harness::new();
    let created = equipment_post(&h).await;

    let err = h
        .service
        .start_task(&TenantContext::new(2, 20), created.tasks[0].id)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::NotFound { .. }));
}
