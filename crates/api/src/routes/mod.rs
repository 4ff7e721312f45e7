pub mod health;
pub mod task_feed;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                         WebSocket (invalidations, post banners)
///
/// /task-feed/templates                        list, create
/// /task-feed/templates/seed                   install default catalog (POST)
/// /task-feed/templates/{id}                   get, update
///
/// /task-feed/posts                            list, create (fan-out)
/// /task-feed/posts/{id}                       detail
/// /task-feed/posts/{id}/reevaluate            re-run workflow rules (POST)
/// /task-feed/posts/{id}/cancel                cancel with reason (POST)
/// /task-feed/posts/{id}/followup              flag (POST), clear (DELETE)
///
/// /task-feed/departments/{code}/tasks         department queue (GET)
/// /task-feed/tasks/{id}/start                 start (POST)
/// /task-feed/tasks/{id}/complete              complete (POST)
/// /task-feed/tasks/{id}/skip                  skip with reason (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/task-feed", task_feed::router())
}
