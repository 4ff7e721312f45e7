//! Task feed orchestration engine.
//!
//! [`TaskFeedService`] implements the template store, post fan-out, the
//! department task tracker and rule side-effect dispatch on top of a
//! [`TaskFeedStore`]. External effects go through the [`Notifier`],
//! [`CmmsClient`] and [`TaskPermissions`] collaborators.

pub mod cmms;
pub mod error;
pub mod notify;
pub mod outcome;
pub mod permissions;
pub mod service;
pub mod store;

pub use cmms::{CmmsClient, HttpCmmsClient, UnconfiguredCmms, WorkOrderRequest};
pub use error::{DispatchError, WorkflowError};
pub use notify::{AlertRequest, Notifier, UnconfiguredNotifier, WebhookNotifier};
pub use outcome::{PostCreation, PostDetail, RuleOutcome, SeedFailure, SeedReport};
pub use permissions::{AllowAllPermissions, TaskPermissions};
pub use service::TaskFeedService;
pub use store::{
    NewFormLink, NewPost, PgTaskFeedStore, PostCancellation, PostFilter, TaskFeedStore,
    TaskTransition, TemplateFilter, TemplateRevision,
};

#[cfg(any(test, feature = "test-support"))]
pub use store::memory::MemoryStore;

#[cfg(test)]
mod tests;
