//! HTTP-level tests for the department task tracker.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_json};
use serde_json::json;

/// Create a low-severity equipment post and return its single task id.
async fn maintenance_task(app: &axum::Router) -> i64 {
    let template_id = common::seeded_template_id(app, "Equipment Failure").await;
    let created = body_json(
        post_json(
            app,
            "/api/v1/task-feed/posts",
            json!({
                "template_id": template_id,
                "form_data": {"equipment": "Filler 3", "severity": "low"}
            }),
        )
        .await,
    )
    .await;
    created["data"]["tasks"][0]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn department_queue_lists_open_tasks() {
    let app = common::build_test_app();
    let task_id = maintenance_task(&app).await;

    let json = body_json(get(&app, "/api/v1/task-feed/departments/1001/tasks").await).await;
    let ids: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, [task_id]);

    let json = body_json(get(&app, "/api/v1/task-feed/departments/1004/tasks").await).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn start_then_complete_rolls_up_post() {
    let app = common::build_test_app();
    let task_id = maintenance_task(&app).await;

    let started = body_json(
        post_json(&app, &format!("/api/v1/task-feed/tasks/{task_id}/start"), json!({})).await,
    )
    .await;
    assert_eq!(started["data"]["task"]["status"], "in_progress");
    assert_eq!(started["data"]["post"]["status"], "in_progress");

    let response = post_json(
        &app,
        &format!("/api/v1/task-feed/tasks/{task_id}/complete"),
        json!({
            "notes": "Replaced the seal",
            "linked_reference": {"form_type": "inspection", "form_id": "INS-7"}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["task"]["status"], "completed");
    assert_eq!(json["data"]["post"]["status"], "completed");
    assert_eq!(json["data"]["form_link"]["form_id"], "INS-7");
}

#[tokio::test]
async fn completing_twice_returns_409() {
    let app = common::build_test_app();
    let task_id = maintenance_task(&app).await;
    let uri = format!("/api/v1/task-feed/tasks/{task_id}/complete");

    assert_eq!(post_json(&app, &uri, json!({})).await.status(), StatusCode::OK);

    let response = post_json(&app, &uri, json!({})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "ALREADY_COMPLETED");
}

#[tokio::test]
async fn skip_without_reason_is_rejected() {
    let app = common::build_test_app();
    let task_id = maintenance_task(&app).await;

    let response = post_json(
        &app,
        &format!("/api/v1/task-feed/tasks/{task_id}/skip"),
        json!({"reason": ""}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app,
        &format!("/api/v1/task-feed/tasks/{task_id}/skip"),
        json!({"reason": "Handled by contractor"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["task"]["status"], "skipped");
    assert_eq!(json["data"]["post"]["status"], "completed");
}

#[tokio::test]
async fn unknown_task_returns_404() {
    let app = common::build_test_app();
    let response = post_json(&app, "/api/v1/task-feed/tasks/999/start", json!({})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
