//! Authorization hook for department task overrides.

use async_trait::async_trait;
use taskfeed_core::task::DepartmentTask;
use taskfeed_core::types::TenantContext;

/// Decides whether the actor may skip a department task.
#[async_trait]
pub trait TaskPermissions: Send + Sync {
    async fn can_skip(&self, ctx: &TenantContext, task: &DepartmentTask) -> bool;
}

/// Default policy: any member of the organization may skip.
pub struct AllowAllPermissions;

#[async_trait]
impl TaskPermissions for AllowAllPermissions {
    async fn can_skip(&self, _ctx: &TenantContext, _task: &DepartmentTask) -> bool {
        true
    }
}
