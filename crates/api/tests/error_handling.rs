//! Tests for `AppError` to HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use assert_matches::assert_matches;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use taskfeed_api::error::AppError;
use taskfeed_core::error::{CoreError, FieldViolation};
use taskfeed_workflow::WorkflowError;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "post",
        id: 42,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "post with id 42 not found");
}

#[tokio::test]
async fn form_validation_lists_violations() {
    let err = AppError::Core(CoreError::FormValidation(vec![
        FieldViolation::new("area", "required", "Area is required"),
        FieldViolation::new("photo", "required", "A photo is required"),
    ]));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "FORM_INVALID");
    assert_eq!(json["violations"].as_array().unwrap().len(), 2);
    assert_eq!(json["violations"][1]["field"], "photo");
}

#[tokio::test]
async fn already_completed_returns_409() {
    let err = AppError::Core(CoreError::AlreadyCompleted { task_id: 7 });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "ALREADY_COMPLETED");
}

#[tokio::test]
async fn forbidden_returns_403() {
    let err = AppError::Core(CoreError::Forbidden("Skipping is not allowed".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
    assert_eq!(json["error"], "Skipping is not allowed");
}

#[tokio::test]
async fn internal_error_hides_details() {
    let err = AppError::Core(CoreError::Internal("connection reset by peer".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn row_not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unauthorized_returns_401() {
    let err = AppError::Unauthorized("x-organization-id header is required".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
    assert!(json.get("violations").is_none());
}

#[tokio::test]
async fn bad_request_returns_400() {
    let err = AppError::BadRequest("Unknown post status 'closed'".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "Unknown post status 'closed'");
}

#[test]
fn workflow_errors_keep_their_variant() {
    let core = AppError::from(WorkflowError::Core(CoreError::AlreadyCompleted { task_id: 3 }));
    assert_matches!(core, AppError::Core(CoreError::AlreadyCompleted { task_id: 3 }));

    let db = AppError::from(WorkflowError::Database(sqlx::Error::RowNotFound));
    assert_matches!(db, AppError::Database(sqlx::Error::RowNotFound));
}
