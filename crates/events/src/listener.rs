//! Postgres `LISTEN` bridge into the [`ChangeHub`].
//!
//! Triggers on the task feed tables call `pg_notify('task_feed_changes', …)`
//! (see `db/migrations`). [`PgChangeListener`] runs as a long-lived background
//! task and republishes every notification as a [`RowChange`].

use std::sync::Arc;

use sqlx::postgres::PgListener;
use taskfeed_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::change::{ChangeHub, RowChange, WATCHED_TABLES};

/// Channel the change triggers notify on.
pub const CHANGE_CHANNEL: &str = "task_feed_changes";

/// Background service that forwards Postgres notifications to the hub.
pub struct PgChangeListener {
    pool: DbPool,
    hub: Arc<ChangeHub>,
}

impl PgChangeListener {
    pub fn new(pool: DbPool, hub: Arc<ChangeHub>) -> Self {
        Self { pool, hub }
    }

    /// Run the listener loop until `cancel` fires.
    ///
    /// A dropped connection is re-established by the next receive. Changes
    /// committed in between never arrive, so a resync event is published for
    /// every watched table to make consumers re-fetch. A failure to connect
    /// closes the hub so later subscribers learn the feed is unavailable.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), sqlx::Error> {
        let mut listener = match self.connect().await {
            Ok(listener) => listener,
            Err(e) => {
                self.hub.close();
                return Err(e);
            }
        };
        tracing::info!(channel = CHANGE_CHANNEL, "Listening for task feed changes");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Change listener cancelled");
                    break;
                }
                received = listener.try_recv() => match received {
                    Ok(Some(notification)) => self.forward(notification.payload()),
                    Ok(None) => {
                        tracing::warn!("Change listener connection lost, reconnecting");
                        publish_resync(&self.hub);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Change listener failed");
                        self.hub.close();
                        return Err(e);
                    }
                },
            }
        }

        Ok(())
    }

    async fn connect(&self) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        Ok(listener)
    }

    fn forward(&self, payload: &str) {
        match RowChange::from_payload(payload) {
            Ok(change) => {
                tracing::trace!(
                    table = %change.table,
                    event_type = ?change.event_type,
                    row_id = change.row_id(),
                    "Row change received"
                );
                self.hub.publish(change);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed change notification");
            }
        }
    }
}

/// Publish one [`RowChange::resync`] per watched table.
fn publish_resync(hub: &ChangeHub) {
    for table in WATCHED_TABLES {
        hub.publish(RowChange::resync(table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeEventType;

    #[tokio::test]
    async fn reconnect_publishes_resync_for_every_watched_table() {
        let hub = ChangeHub::new(16);
        let mut receiver = hub.subscribe().unwrap();

        publish_resync(&hub);

        let mut tables = Vec::new();
        while let Ok(change) = receiver.try_recv() {
            assert_eq!(change.event_type, ChangeEventType::Update);
            assert!(change.record().is_none());
            assert_eq!(change.row_id(), None);
            tables.push(change.table);
        }
        assert_eq!(tables, WATCHED_TABLES);
    }
}
