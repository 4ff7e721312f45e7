//! Route definitions for templates, posts and department tasks.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{posts, tasks, templates};
use crate::state::AppState;

/// Routes mounted at `/task-feed`.
///
/// Every route requires the `x-organization-id` and `x-user-id` headers
/// (enforced by the `Tenant` extractor).
///
/// ```text
/// GET    /templates                    -> list_templates
/// POST   /templates                    -> create_template
/// POST   /templates/seed               -> seed_defaults
/// GET    /templates/{id}               -> get_template
/// PUT    /templates/{id}               -> update_template
/// GET    /posts                        -> list_posts
/// POST   /posts                        -> create_post
/// GET    /posts/{id}                   -> get_post
/// POST   /posts/{id}/reevaluate        -> reevaluate_rules
/// POST   /posts/{id}/cancel            -> cancel_post
/// POST   /posts/{id}/followup          -> flag_followup
/// DELETE /posts/{id}/followup          -> clear_followup
/// GET    /departments/{code}/tasks     -> list_department_tasks
/// POST   /tasks/{id}/start             -> start_task
/// POST   /tasks/{id}/complete          -> complete_task
/// POST   /tasks/{id}/skip              -> skip_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route("/templates/seed", post(templates::seed_defaults))
        .route(
            "/templates/{id}",
            get(templates::get_template).put(templates::update_template),
        )
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/{id}", get(posts::get_post))
        .route("/posts/{id}/reevaluate", post(posts::reevaluate_rules))
        .route("/posts/{id}/cancel", post(posts::cancel_post))
        .route(
            "/posts/{id}/followup",
            post(posts::flag_followup).delete(posts::clear_followup),
        )
        .route(
            "/departments/{code}/tasks",
            get(tasks::list_department_tasks),
        )
        .route("/tasks/{id}/start", post(tasks::start_task))
        .route("/tasks/{id}/complete", post(tasks::complete_task))
        .route("/tasks/{id}/skip", post(tasks::skip_task))
}
