use assert_matches::assert_matches;
use serde_json::json;
use taskfeed_core::department::{DEPT_MAINTENANCE, DEPT_PRODUCTION, DEPT_SAFETY};
use taskfeed_core::error::CoreError;
use taskfeed_core::seed::{
    default_templates, TEMPLATE_EQUIPMENT_FAILURE, TEMPLATE_PRE_OP, TEMPLATE_PURCHASE_REQUEST,
    TEMPLATE_SANITATION_ISSUE,
};
use taskfeed_core::template::{ButtonType, TemplatePatch};
use taskfeed_core::types::TenantContext;

use super::{ctx, Harness};
use crate::error::WorkflowError;
use crate::store::TemplateFilter;
use crate::MemoryStore;

#[tokio::test]
async fn seeding_is_idempotent() {
    let h = Harness::new();
    let catalog: Vec<String> = default_templates().into_iter().map(|d| d.name).collect();

    let first = h.service.seed_defaults(&ctx()).await;
    assert_eq!(first.created, catalog);
    assert!(first.skipped.is_empty());
    assert!(first.errors.is_empty());

    let second = h.service.seed_defaults(&ctx()).await;
    assert!(second.created.is_empty());
    assert_eq!(second.skipped, catalog);

    let templates = h
        .service
        .list_templates(&ctx(), &TemplateFilter::default())
        .await
        .unwrap();
    assert_eq!(templates.len(), catalog.len());
}

#[tokio::test]
async fn seeding_skips_names_already_taken() {
    let h = Harness::new();
    let mut custom = default_templates().remove(1);
    custom.description = Some("Site-specific variant".into());
    h.service.create_template(&ctx(), custom).await.unwrap();

    let report = h.service.seed_defaults(&ctx()).await;
    assert_eq!(report.skipped, vec![TEMPLATE_EQUIPMENT_FAILURE.to_string()]);
    assert_eq!(report.created.len(), 4);
}

#[tokio::test]
async fn seeding_collects_failures_and_continues() {
    let store = MemoryStore::new();
    store.fail_template_insert(TEMPLATE_SANITATION_ISSUE);
    let h = Harness::with_store(store);

    let report = h.service.seed_defaults(&ctx()).await;

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].name, TEMPLATE_SANITATION_ISSUE);
    assert!(report.errors[0].error.contains("failed"));
    assert_eq!(report.created.len(), 4);
    assert!(!report.created.contains(&TEMPLATE_SANITATION_ISSUE.to_string()));
    assert!(report.skipped.is_empty());

    let names: Vec<_> = h
        .service
        .list_templates(&ctx(), &TemplateFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(names.len(), 4);
}

#[tokio::test]
async fn invalid_template_reports_every_violation() {
    let h = Harness::new();
    let mut definition = default_templates().remove(0);
    definition.name = " ".into();
    definition.assigned_departments = vec![DEPT_SAFETY.into(), DEPT_SAFETY.into()];

    let err = h
        .service
        .create_template(&ctx(), definition)
        .await
        .unwrap_err();
    let fields: Vec<_> = err
        .core()
        .and_then(|e| e.violations())
        .unwrap()
        .iter()
        .map(|v| v.field.clone())
        .collect();
    assert!(fields.contains(&"name".to_string()));
    assert!(fields.iter().any(|f| f.starts_with("assigned_departments")));
}

#[tokio::test]
async fn unreferenced_template_is_updated_in_place() {
    let h = Harness::new();
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;

    let updated = h
        .service
        .update_template(
            &ctx(),
            template.id,
            TemplatePatch {
                assigned_departments: Some(vec![DEPT_MAINTENANCE.into(), DEPT_SAFETY.into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.id, template.id);
    assert_eq!(updated.version, 1);
    assert_eq!(updated.definition.assigned_departments.len(), 2);
}

#[tokio::test]
async fn referenced_template_is_versioned_on_edit() {
    let h = Harness::new();
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;
    let created = h
        .post(&ctx(), &template, json!({"equipment": "Filler 3", "severity": "low"}))
        .await;

    let next = h
        .service
        .update_template(
            &ctx(),
            template.id,
            TemplatePatch {
                assigned_departments: Some(vec![DEPT_MAINTENANCE.into(), DEPT_SAFETY.into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_ne!(next.id, template.id);
    assert_eq!(next.version, 2);
    assert_eq!(next.supersedes_id, Some(template.id));
    assert!(next.definition.is_active);

    let previous = h.service.get_template(&ctx(), template.id).await.unwrap();
    assert!(!previous.definition.is_active);
    assert_eq!(previous.definition.assigned_departments, vec![DEPT_MAINTENANCE]);

    // The post keeps the snapshot it was created from.
    let detail = h.service.get_post(&ctx(), created.post.id).await.unwrap();
    assert_eq!(detail.post.template_snapshot, template);
    assert_eq!(detail.tasks.len(), 1);
}

#[tokio::test]
async fn superseded_version_cannot_be_edited() {
    let h = Harness::new();
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;
    h.post(&ctx(), &template, json!({"equipment": "Filler 3", "severity": "low"}))
        .await;
    let patch = || TemplatePatch {
        description: Some("Report a broken machine".into()),
        ..Default::default()
    };

    let head = h
        .service
        .update_template(&ctx(), template.id, patch())
        .await
        .unwrap();
    let err = h
        .service
        .update_template(&ctx(), template.id, patch())
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::Conflict(_)));

    let versions: Vec<_> = h
        .service
        .list_templates(&ctx(), &TemplateFilter::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.name() == TEMPLATE_EQUIPMENT_FAILURE)
        .map(|t| (t.id, t.version, t.definition.is_active))
        .collect();
    assert_eq!(versions.len(), 2);
    assert!(versions.contains(&(head.id, 2, true)));
    assert!(versions.contains(&(template.id, 1, false)));

    // The head itself stays editable.
    let deactivated = h
        .service
        .update_template(
            &ctx(),
            head.id,
            TemplatePatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(deactivated.id, head.id);
    assert!(!deactivated.definition.is_active);
}

#[tokio::test]
async fn deactivating_referenced_template_keeps_the_row() {
    let h = Harness::new();
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;
    h.post(&ctx(), &template, json!({"equipment": "Filler 3", "severity": "low"}))
        .await;

    let updated = h
        .service
        .update_template(
            &ctx(),
            template.id,
            TemplatePatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.id, template.id);
    assert_eq!(updated.version, 1);
    assert!(!updated.definition.is_active);
}

#[tokio::test]
async fn invalid_patch_leaves_template_untouched() {
    let h = Harness::new();
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;

    let err = h
        .service
        .update_template(
            &ctx(),
            template.id,
            TemplatePatch {
                assigned_departments: Some(Vec::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::TemplateValidation(_)));

    let unchanged = h.service.get_template(&ctx(), template.id).await.unwrap();
    assert_eq!(unchanged, template);
}

#[tokio::test]
async fn list_filters_by_department_and_button() {
    let h = Harness::new();
    h.service.seed_defaults(&ctx()).await;

    let names = |templates: Vec<taskfeed_core::template::Template>| -> Vec<String> {
        templates.into_iter().map(|t| t.name().to_string()).collect()
    };

    let from_production = h
        .service
        .list_templates(
            &ctx(),
            &TemplateFilter {
                triggering_department: Some(DEPT_PRODUCTION.into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(from_production.len(), 5);

    let from_maintenance = names(
        h.service
            .list_templates(
                &ctx(),
                &TemplateFilter {
                    triggering_department: Some(DEPT_MAINTENANCE.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap(),
    );
    assert_eq!(from_maintenance.len(), 4);
    assert!(!from_maintenance.contains(&TEMPLATE_PRE_OP.to_string()));

    let purchases = names(
        h.service
            .list_templates(
                &ctx(),
                &TemplateFilter {
                    button_type: Some(ButtonType::RequestPurchase),
                    ..Default::default()
                },
            )
            .await
            .unwrap(),
    );
    assert_eq!(purchases, vec![TEMPLATE_PURCHASE_REQUEST.to_string()]);
}

#[tokio::test]
async fn active_only_hides_deactivated_templates() {
    let h = Harness::new();
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;
    h.service
        .update_template(
            &ctx(),
            template.id,
            TemplatePatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let active = h
        .service
        .list_templates(
            &ctx(),
            &TemplateFilter {
                active_only: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(active.len(), 4);
    assert!(active.iter().all(|t| t.id != template.id));
}

#[tokio::test]
async fn templates_are_scoped_to_the_organization() {
    let h = Harness::new();
    let template = h.seeded(&ctx(), TEMPLATE_EQUIPMENT_FAILURE).await;

    let err = h
        .service
        .get_template(&TenantContext::new(2, 20), template.id)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::Core(CoreError::NotFound { entity: "template", .. }));
}
