use serde::{Deserialize, Serialize};

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Request-scoped tenant and actor identity.
///
/// Passed explicitly to every task-feed operation instead of being read from
/// ambient state, so the engine can be exercised without any HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub organization_id: DbId,
    pub user_id: DbId,
}

impl TenantContext {
    pub fn new(organization_id: DbId, user_id: DbId) -> Self {
        Self {
            organization_id,
            user_id,
        }
    }
}
