#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use taskfeed_api::config::ServerConfig;
use taskfeed_api::context::{ORGANIZATION_HEADER, USER_HEADER};
use taskfeed_api::router::build_app_router;
use taskfeed_api::state::AppState;
use taskfeed_api::ws::WsManager;
use taskfeed_workflow::{MemoryStore, TaskFeedService};

pub const ORGANIZATION_ID: i64 = 1;
pub const USER_ID: i64 = 10;

/// Build a test `ServerConfig` with safe defaults and no integrations.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        realtime_debounce_ms: 300,
        cmms_url: None,
        alert_webhook_url: None,
    }
}

/// A router over a fresh in-memory store, with the production middleware
/// stack. Clone the returned router to issue several requests against the
/// same store.
pub fn build_test_app() -> Router {
    let config = test_config();
    let state = AppState {
        pool: None,
        config: Arc::new(config.clone()),
        ws_manager: Arc::new(WsManager::new()),
        task_feed: TaskFeedService::new(Arc::new(MemoryStore::new())),
    };
    build_app_router(state, &config)
}

fn tenant_request(method: Method, uri: &str, organization_id: i64) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(ORGANIZATION_HEADER, organization_id.to_string())
        .header(USER_HEADER, USER_ID.to_string())
}

/// GET with tenant headers.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    get_as(app, uri, ORGANIZATION_ID).await
}

pub async fn get_as(app: &Router, uri: &str, organization_id: i64) -> Response<Body> {
    let request = tenant_request(Method::GET, uri, organization_id)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// GET without tenant headers.
pub async fn get_anonymous(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, Method::PUT, uri, body).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    let request = tenant_request(Method::DELETE, uri, ORGANIZATION_ID)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn send_json(app: &Router, method: Method, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = tenant_request(method, uri, ORGANIZATION_ID)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Seed the default catalog and return the id of the named template.
pub async fn seeded_template_id(app: &Router, name: &str) -> i64 {
    let response = post_json(app, "/api/v1/task-feed/templates/seed", serde_json::json!({})).await;
    assert!(response.status().is_success());

    let json = body_json(get(app, "/api/v1/task-feed/templates").await).await;
    json["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == name)
        .and_then(|t| t["id"].as_i64())
        .unwrap_or_else(|| panic!("template {name} not seeded"))
}
