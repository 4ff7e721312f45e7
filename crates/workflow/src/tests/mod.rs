//! Engine tests against the in-memory store.

mod tasks;
mod templates;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskfeed_core::post::PostMetadata;
use taskfeed_core::task::DepartmentTask;
use taskfeed_core::template::Template;
use taskfeed_core::types::TenantContext;

use crate::cmms::{CmmsClient, WorkOrderRequest};
use crate::error::DispatchError;
use crate::notify::{AlertRequest, Notifier};
use crate::outcome::PostCreation;
use crate::permissions::TaskPermissions;
use crate::store::TemplateFilter;
use crate::{MemoryStore, TaskFeedService};

/// Creates one work order per idempotency key, like a CMMS honouring the
/// header; fails every request while `failing`.
#[derive(Default)]
pub(crate) struct RecordingCmms {
    pub requests: Mutex<Vec<WorkOrderRequest>>,
    pub attempts: AtomicI64,
    /// Idempotency key of every call, including failed ones.
    pub keys: Mutex<Vec<String>>,
    failing: AtomicBool,
    lose_next_response: AtomicBool,
}

impl RecordingCmms {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Create the next work order but fail the call as if the response
    /// timed out.
    pub fn lose_next_response(&self) {
        self.lose_next_response.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<WorkOrderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CmmsClient for RecordingCmms {
    async fn create_work_order(&self, request: &WorkOrderRequest) -> Result<String, DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(request.idempotency_key.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport {
                service: "CMMS",
                message: "connection refused".into(),
            });
        }
        let mut requests = self.requests.lock().unwrap();
        let existing = requests
            .iter()
            .position(|r| r.idempotency_key == request.idempotency_key);
        let number = match existing {
            Some(index) => index + 1,
            None => {
                requests.push(request.clone());
                requests.len()
            }
        };
        if self.lose_next_response.swap(false, Ordering::SeqCst) {
            return Err(DispatchError::Transport {
                service: "CMMS",
                message: "operation timed out".into(),
            });
        }
        Ok(format!("WO-{number}"))
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub alerts: Mutex<Vec<AlertRequest>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn alert_personnel(&self, alert: &AlertRequest) -> Result<(), DispatchError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub(crate) struct DenySkips;

#[async_trait]
impl TaskPermissions for DenySkips {
    async fn can_skip(&self, _ctx: &TenantContext, _task: &DepartmentTask) -> bool {
        false
    }
}

pub(crate) struct Harness {
    pub service: TaskFeedService,
    pub store: Arc<MemoryStore>,
    pub cmms: Arc<RecordingCmms>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        let cmms = Arc::new(RecordingCmms::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = TaskFeedService::new(store.clone())
            .with_cmms(cmms.clone())
            .with_notifier(notifier.clone());
        Self {
            service,
            store,
            cmms,
            notifier,
        }
    }

    /// Seed the catalog for `ctx` and return the template called `name`.
    pub async fn seeded(&self, ctx: &TenantContext, name: &str) -> Template {
        self.service.seed_defaults(ctx).await;
        self.service
            .list_templates(ctx, &TemplateFilter::default())
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.name() == name)
            .unwrap_or_else(|| panic!("template {name} not seeded"))
    }

    pub async fn post(
        &self,
        ctx: &TenantContext,
        template: &Template,
        form_data: serde_json::Value,
    ) -> PostCreation {
        self.service
            .create_post(ctx, template.id, &form_data, PostMetadata::default())
            .await
            .unwrap()
    }
}

pub(crate) fn ctx() -> TenantContext {
    TenantContext::new(1, 10)
}
