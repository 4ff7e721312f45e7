//! Engine tests against PostgreSQL.
//!
//! Run with `DATABASE_URL` pointing at a PostgreSQL server and
//! `cargo test -p taskfeed-workflow -- --ignored`.

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use sqlx::PgPool;
use taskfeed_core::error::CoreError;
use taskfeed_core::post::{PostMetadata, PostStatus};
use taskfeed_core::seed::{TEMPLATE_EQUIPMENT_FAILURE, TEMPLATE_PRE_OP};
use taskfeed_core::task::DepartmentTaskStatus;
use taskfeed_core::template::{Template, TemplatePatch};
use taskfeed_core::types::TenantContext;
use taskfeed_workflow::{PgTaskFeedStore, TaskFeedService, WorkflowError};

fn ctx() -> TenantContext {
    TenantContext::new(7, 1)
}

async fn seeded(service: &TaskFeedService, name: &str) -> Template {
    service.seed_defaults(&ctx()).await;
    service
        .list_templates(&ctx(), &Default::default())
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.name() == name)
        .unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn concurrent_completions_roll_up_once(pool: PgPool) {
    let service = TaskFeedService::new(Arc::new(PgTaskFeedStore::new(pool)));
    let template = seeded(&service, TEMPLATE_PRE_OP).await;
    let created = service
        .create_post(
            &ctx(),
            template.id,
            &json!({"line": "L2", "result": "pass", "inspection_date": "2024-06-03"}),
            PostMetadata::default(),
        )
        .await
        .unwrap();

    let handles: Vec<_> = created
        .tasks
        .iter()
        .map(|task| {
            let service = service.clone();
            let task_id = task.id;
            tokio::spawn(async move { service.complete_task(&ctx(), task_id, None, None).await })
        })
        .collect();
    let mut closing = 0;
    for handle in handles {
        let transition = handle.await.unwrap().unwrap();
        if transition.post_status_changed() && transition.post.status == PostStatus::Completed {
            closing += 1;
        }
    }
    assert_eq!(closing, 1);

    let detail = service.get_post(&ctx(), created.post.id).await.unwrap();
    assert!(detail
        .tasks
        .iter()
        .all(|t| t.status == DepartmentTaskStatus::Completed));
    assert_eq!(detail.post.status, PostStatus::Completed);
    assert!(detail.post.completed_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
async fn superseded_version_is_read_only(pool: PgPool) {
    let service = TaskFeedService::new(Arc::new(PgTaskFeedStore::new(pool)));
    let template = seeded(&service, TEMPLATE_EQUIPMENT_FAILURE).await;
    service
        .create_post(
            &ctx(),
            template.id,
            &json!({"equipment": "Filler 3", "severity": "low"}),
            PostMetadata::default(),
        )
        .await
        .unwrap();
    let patch = || TemplatePatch {
        description: Some("Report a broken machine".into()),
        ..Default::default()
    };

    let head = service
        .update_template(&ctx(), template.id, patch())
        .await
        .unwrap();
    assert_eq!(head.version, 2);

    let err = service
        .update_template(&ctx(), template.id, patch())
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Conflict(_)));
}
