use taskfeed_core::error::CoreError;

/// Errors surfaced by [`TaskFeedService`](crate::TaskFeedService) operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkflowError {
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            WorkflowError::Core(e) => Some(e),
            WorkflowError::Database(_) => None,
        }
    }
}

/// A rule side effect that could not be carried out.
///
/// Never propagated: it is reported as a warning on the rule outcome and
/// recorded in the dispatch ledger as `failed`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("No {0} is configured")]
    NotConfigured(&'static str),

    #[error("Request to {service} failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },

    #[error("Dispatch ledger unavailable: {0}")]
    Ledger(String),
}
