//! Task feed change propagation.
//!
//! - [`ChangeHub`]: in-process publish/subscribe hub for [`RowChange`]s,
//!   backed by `tokio::sync::broadcast`.
//! - [`PgChangeListener`]: background service feeding the hub from
//!   Postgres `LISTEN task_feed_changes`.
//! - [`RealtimeSync`]: per-table subscriptions with immediate handlers and
//!   debounced cache invalidation.
//! - [`delivery`]: outbound webhook delivery.

pub mod change;
pub mod delivery;
pub mod listener;
pub mod realtime;

pub use change::{ChangeEventType, ChangeHub, RowChange};
pub use delivery::webhook::WebhookDelivery;
pub use listener::PgChangeListener;
pub use realtime::{
    CacheInvalidator, ChangeHandler, ChangeHandlers, RealtimeSubscriptionError, RealtimeSync,
    Subscription,
};
