//! Bridges row-change events to WebSocket clients.
//!
//! Each watched table invalidates a fixed set of client cache keys after a
//! debounced burst; post inserts additionally push an immediate banner to
//! the post's organization.

use std::sync::Arc;

use taskfeed_core::types::DbId;
use taskfeed_events::change::{
    RowChange, TABLE_DEPARTMENT_TASKS, TABLE_FORM_LINKS, TABLE_POSTS, TABLE_TEMPLATES,
};
use taskfeed_events::{CacheInvalidator, ChangeHandlers, RealtimeSync, Subscription};

use crate::ws::{ServerMessage, WsManager};

pub const TARGET_TEMPLATES: &str = "task-feed-templates";
pub const TARGET_POSTS: &str = "task-feed-posts";
pub const TARGET_POST_DETAIL: &str = "task-feed-post-detail";
pub const TARGET_DEPARTMENT_TASKS: &str = "task-feed-department-tasks";

/// Cache keys a change on `table` makes stale.
pub fn invalidation_targets(table: &str) -> Vec<String> {
    let targets: &[&str] = match table {
        TABLE_TEMPLATES => &[TARGET_TEMPLATES],
        TABLE_POSTS => &[TARGET_POSTS, TARGET_POST_DETAIL],
        TABLE_DEPARTMENT_TASKS => &[TARGET_DEPARTMENT_TASKS, TARGET_POSTS, TARGET_POST_DETAIL],
        TABLE_FORM_LINKS => &[TARGET_POST_DETAIL],
        _ => &[],
    };
    targets.iter().map(|t| t.to_string()).collect()
}

/// Pushes `invalidate` messages to every connected client.
pub struct WsInvalidator {
    ws_manager: Arc<WsManager>,
}

impl WsInvalidator {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }
}

impl CacheInvalidator for WsInvalidator {
    fn invalidate(&self, targets: &[String]) {
        let message = ServerMessage::Invalidate {
            targets: targets.to_vec(),
        }
        .to_message();
        let ws_manager = Arc::clone(&self.ws_manager);
        tokio::spawn(async move {
            ws_manager.broadcast(message).await;
        });
    }
}

/// Build the banner for a post insert. `None` when the row image was
/// reduced to its identifying columns.
pub fn post_created_message(change: &RowChange) -> Option<(DbId, ServerMessage)> {
    let row = change.new.as_ref()?;
    let organization_id = change.organization_id()?;
    let message = ServerMessage::PostCreated {
        post_id: change.row_id()?,
        post_number: row.get("post_number")?.as_str()?.to_string(),
        template_name: row
            .get("template_snapshot")
            .and_then(|s| s.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string),
    };
    Some((organization_id, message))
}

/// Subscribe every watched table. Tables that fail to subscribe are logged
/// and left stale until the client refreshes.
pub fn start_realtime(sync: &RealtimeSync, ws_manager: Arc<WsManager>) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();

    for table in [TABLE_TEMPLATES, TABLE_POSTS, TABLE_DEPARTMENT_TASKS, TABLE_FORM_LINKS] {
        let handlers = if table == TABLE_POSTS {
            let ws_manager = Arc::clone(&ws_manager);
            ChangeHandlers::default().on_insert(move |change| {
                let Some((organization_id, message)) = post_created_message(change) else {
                    return;
                };
                let ws_manager = Arc::clone(&ws_manager);
                tokio::spawn(async move {
                    ws_manager
                        .send_to_organization(organization_id, message.to_message())
                        .await;
                });
            })
        } else {
            ChangeHandlers::default()
        };

        match sync.subscribe(table, invalidation_targets(table), handlers) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(e) => {
                tracing::warn!(table, error = %e, "Realtime subscription failed, clients refresh manually");
            }
        }
    }

    tracing::info!(count = subscriptions.len(), "Realtime subscriptions started");
    subscriptions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_changes_invalidate_posts_too() {
        let targets = invalidation_targets(TABLE_DEPARTMENT_TASKS);
        assert!(targets.contains(&TARGET_POSTS.to_string()));
        assert!(targets.contains(&TARGET_DEPARTMENT_TASKS.to_string()));
        assert!(invalidation_targets("users").is_empty());
    }

    #[test]
    fn banner_reads_post_row() {
        let change = RowChange::insert(
            TABLE_POSTS,
            json!({
                "id": 12,
                "organization_id": 3,
                "post_number": "TF-000012",
                "template_snapshot": {"name": "Equipment Failure"}
            }),
        );
        let (organization_id, message) = post_created_message(&change).unwrap();
        assert_eq!(organization_id, 3);
        assert_eq!(
            message,
            ServerMessage::PostCreated {
                post_id: 12,
                post_number: "TF-000012".into(),
                template_name: Some("Equipment Failure".into()),
            }
        );
    }

    #[test]
    fn reduced_row_has_no_banner() {
        let change = RowChange::insert(TABLE_POSTS, json!({"id": 12, "organization_id": 3}));
        assert!(post_created_message(&change).is_none());
    }
}
