//! Debounced cache invalidation driven by row changes.
//!
//! A [`Subscription`] watches one table. Every matching change runs the
//! immediate handler for its event type and re-arms a debounce timer; when
//! the table has been quiet for the debounce window, the subscription's
//! invalidation targets are handed to the [`CacheInvalidator`] once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::change::{ChangeEventType, ChangeHub, RowChange, WATCHED_TABLES};

/// Default quiet period before invalidating.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failure to establish a subscription.
///
/// Callers log it and fall back to stale-until-refresh.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeSubscriptionError {
    #[error("Table '{0}' does not publish change events")]
    UnknownTable(String),

    #[error("Change feed is closed")]
    FeedClosed,
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Receives the invalidation targets once a burst of changes settles.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, targets: &[String]);
}

pub type ChangeHandler = Arc<dyn Fn(&RowChange) + Send + Sync>;

/// Immediate per-event callbacks. Each runs before the debounce timer is
/// re-armed.
#[derive(Clone, Default)]
pub struct ChangeHandlers {
    pub on_insert: Option<ChangeHandler>,
    pub on_update: Option<ChangeHandler>,
    pub on_delete: Option<ChangeHandler>,
}

impl ChangeHandlers {
    pub fn on_insert(mut self, handler: impl Fn(&RowChange) + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(handler));
        self
    }

    pub fn on_update(mut self, handler: impl Fn(&RowChange) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(handler));
        self
    }

    pub fn on_delete(mut self, handler: impl Fn(&RowChange) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Arc::new(handler));
        self
    }

    fn dispatch(&self, change: &RowChange) {
        let handler = match change.event_type {
            ChangeEventType::Insert => &self.on_insert,
            ChangeEventType::Update => &self.on_update,
            ChangeEventType::Delete => &self.on_delete,
        };
        if let Some(handler) = handler {
            handler(change);
        }
    }
}

// ---------------------------------------------------------------------------
// RealtimeSync
// ---------------------------------------------------------------------------

/// Factory for table subscriptions sharing one hub and one invalidator.
#[derive(Clone)]
pub struct RealtimeSync {
    hub: Arc<ChangeHub>,
    invalidator: Arc<dyn CacheInvalidator>,
    debounce: Duration,
}

impl RealtimeSync {
    pub fn new(hub: Arc<ChangeHub>, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self {
            hub,
            invalidator,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Watch `table`, invalidating `targets` after each burst of changes.
    ///
    /// Must be called from within a Tokio runtime. The subscription is
    /// active as soon as this returns; changes published afterwards are
    /// observed.
    pub fn subscribe(
        &self,
        table: &str,
        targets: Vec<String>,
        handlers: ChangeHandlers,
    ) -> Result<Subscription, RealtimeSubscriptionError> {
        if !WATCHED_TABLES.contains(&table) {
            return Err(RealtimeSubscriptionError::UnknownTable(table.to_string()));
        }
        let receiver = self.hub.subscribe()?;
        let cancel = CancellationToken::new();

        let worker = DebounceWorker {
            table: table.to_string(),
            targets,
            handlers,
            invalidator: Arc::clone(&self.invalidator),
            debounce: self.debounce,
        };
        tokio::spawn(worker.run(receiver, cancel.clone()));

        tracing::debug!(table, "Realtime subscription started");
        Ok(Subscription {
            table: table.to_string(),
            cancel,
        })
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to a running table subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    table: String,
    cancel: CancellationToken,
}

impl Subscription {
    /// Stop receiving changes and discard any pending invalidation.
    /// Calling it again has no effect.
    pub fn unsubscribe(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            tracing::debug!(table = %self.table, "Realtime subscription stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct DebounceWorker {
    table: String,
    targets: Vec<String>,
    handlers: ChangeHandlers,
    invalidator: Arc<dyn CacheInvalidator>,
    debounce: Duration,
}

impl DebounceWorker {
    async fn run(self, mut receiver: broadcast::Receiver<RowChange>, cancel: CancellationToken) {
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = wait_until(deadline) => {
                    deadline = None;
                    tracing::debug!(table = %self.table, targets = ?self.targets, "Invalidating caches");
                    self.invalidator.invalidate(&self.targets);
                }
                received = receiver.recv() => match received {
                    Ok(change) => {
                        if change.table != self.table {
                            continue;
                        }
                        self.handlers.dispatch(&change);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            table = %self.table,
                            skipped,
                            "Realtime subscriber lagged, scheduling invalidation"
                        );
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        if deadline.is_some() {
                            self.invalidator.invalidate(&self.targets);
                        }
                        tracing::info!(table = %self.table, "Change feed closed, subscription ending");
                        break;
                    }
                },
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
