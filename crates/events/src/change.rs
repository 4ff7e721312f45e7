//! Row-change events and the in-process hub that fans them out.
//!
//! [`ChangeHub`] is shared via `Arc<ChangeHub>`. The Postgres listener
//! publishes into it in production; the in-memory store publishes into it
//! directly.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use taskfeed_core::types::DbId;
use tokio::sync::broadcast;

use crate::realtime::RealtimeSubscriptionError;

pub const TABLE_TEMPLATES: &str = "task_feed_templates";
pub const TABLE_POSTS: &str = "task_feed_posts";
pub const TABLE_DEPARTMENT_TASKS: &str = "task_feed_department_tasks";
pub const TABLE_FORM_LINKS: &str = "task_feed_form_links";

/// Tables that publish change events.
pub const WATCHED_TABLES: [&str; 4] = [
    TABLE_TEMPLATES,
    TABLE_POSTS,
    TABLE_DEPARTMENT_TASKS,
    TABLE_FORM_LINKS,
];

// ---------------------------------------------------------------------------
// RowChange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventType {
    Insert,
    Update,
    Delete,
}

/// One row-level change, as published on the `task_feed_changes` channel.
///
/// `new` is absent for deletes and `old` for inserts. Oversized rows arrive
/// reduced to `id` and `organization_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    pub event_type: ChangeEventType,
    #[serde(default)]
    pub new: Option<serde_json::Value>,
    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

impl RowChange {
    pub fn new(
        table: impl Into<String>,
        event_type: ChangeEventType,
        new: Option<serde_json::Value>,
        old: Option<serde_json::Value>,
    ) -> Self {
        Self {
            table: table.into(),
            event_type,
            new,
            old,
        }
    }

    pub fn insert(table: impl Into<String>, row: serde_json::Value) -> Self {
        Self::new(table, ChangeEventType::Insert, Some(row), None)
    }

    pub fn update(table: impl Into<String>, new: serde_json::Value, old: serde_json::Value) -> Self {
        Self::new(table, ChangeEventType::Update, Some(new), Some(old))
    }

    /// An update without row images, meaning "anything in `table` may have
    /// changed". Consumers that need a row id skip it.
    pub fn resync(table: impl Into<String>) -> Self {
        Self::new(table, ChangeEventType::Update, None, None)
    }

    /// Parse a NOTIFY payload.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The current row image, falling back to the old one for deletes.
    pub fn record(&self) -> Option<&serde_json::Value> {
        self.new.as_ref().or(self.old.as_ref())
    }

    pub fn organization_id(&self) -> Option<DbId> {
        self.record()?.get("organization_id")?.as_i64()
    }

    pub fn row_id(&self) -> Option<DbId> {
        self.record()?.get("id")?.as_i64()
    }
}

// ---------------------------------------------------------------------------
// ChangeHub
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out hub for row changes.
///
/// When the buffer is full the oldest un-consumed changes are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct ChangeHub {
    sender: broadcast::Sender<RowChange>,
    closed: AtomicBool,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            closed: AtomicBool::new(false),
        }
    }

    /// Publish a change to all current subscribers.
    ///
    /// If there are no active subscribers the change is silently dropped.
    pub fn publish(&self, change: RowChange) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(change);
    }

    /// Subscribe to every change published from now on.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<RowChange>, RealtimeSubscriptionError> {
        if self.is_closed() {
            return Err(RealtimeSubscriptionError::FeedClosed);
        }
        Ok(self.sender.subscribe())
    }

    /// Refuse new subscriptions, e.g. after the change source has stopped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_trigger_payload() {
        let payload = r#"{"table":"task_feed_posts","event_type":"UPDATE",
            "new":{"id":5,"organization_id":2,"status":"completed"},
            "old":{"id":5,"organization_id":2,"status":"pending"}}"#;
        let change = RowChange::from_payload(payload).unwrap();

        assert_eq!(change.table, TABLE_POSTS);
        assert_eq!(change.event_type, ChangeEventType::Update);
        assert_eq!(change.row_id(), Some(5));
        assert_eq!(change.organization_id(), Some(2));
    }

    #[test]
    fn delete_falls_back_to_old_image() {
        let payload = r#"{"table":"task_feed_form_links","event_type":"DELETE",
            "new":null,"old":{"id":9,"organization_id":3}}"#;
        let change = RowChange::from_payload(payload).unwrap();

        assert!(change.new.is_none());
        assert_eq!(change.row_id(), Some(9));
    }

    #[test]
    fn rejects_unknown_event_type() {
        let payload = r#"{"table":"task_feed_posts","event_type":"TRUNCATE"}"#;
        assert!(RowChange::from_payload(payload).is_err());
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_change() {
        let hub = ChangeHub::default();
        let mut rx1 = hub.subscribe().unwrap();
        let mut rx2 = hub.subscribe().unwrap();

        hub.publish(RowChange::insert(TABLE_POSTS, json!({"id": 1})));

        assert_eq!(rx1.recv().await.unwrap().row_id(), Some(1));
        assert_eq!(rx2.recv().await.unwrap().row_id(), Some(1));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let hub = ChangeHub::default();
        hub.publish(RowChange::insert(TABLE_POSTS, json!({"id": 1})));
    }

    #[test]
    fn closed_hub_refuses_subscribers() {
        let hub = ChangeHub::default();
        hub.close();
        assert!(matches!(
            hub.subscribe(),
            Err(RealtimeSubscriptionError::FeedClosed)
        ));
    }
}
