//! Maintenance system (CMMS) collaborator for rule-created work orders.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskfeed_core::dispatch::WORK_ORDER_SOURCE_TYPE;
use taskfeed_core::post::Post;
use taskfeed_core::rules::{WorkOrderPriority, WorkflowRule};
use taskfeed_core::types::DbId;

use crate::error::DispatchError;

const SERVICE: &str = "CMMS";

/// HTTP request timeout for work order creation.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying [`WorkOrderRequest::idempotency_key`].
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Body of a work order creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderRequest {
    pub organization_id: DbId,
    pub priority: WorkOrderPriority,
    pub source_type: &'static str,
    pub source_id: DbId,
    pub rule_index: usize,
    /// Same for every attempt of one (post, rule), so a retry after a lost
    /// response returns the existing work order.
    pub idempotency_key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl WorkOrderRequest {
    pub fn for_rule(post: &Post, rule_index: usize, rule: &WorkflowRule) -> Self {
        Self {
            organization_id: post.organization_id,
            priority: rule.work_order_priority(),
            source_type: WORK_ORDER_SOURCE_TYPE,
            source_id: post.id,
            rule_index,
            idempotency_key: idempotency_key(post.id, rule_index),
            title: format!("{} {}", post.template_snapshot.name(), post.post_number),
            description: rule.message.clone().or_else(|| post.notes.clone()),
        }
    }
}

/// `task_feed_post:{post_id}:{rule_index}`.
pub fn idempotency_key(post_id: DbId, rule_index: usize) -> String {
    format!("{WORK_ORDER_SOURCE_TYPE}:{post_id}:{rule_index}")
}

#[async_trait]
pub trait CmmsClient: Send + Sync {
    /// Create a work order, returning its id in the maintenance system.
    async fn create_work_order(&self, request: &WorkOrderRequest) -> Result<String, DispatchError>;
}

#[derive(Debug, Deserialize)]
struct WorkOrderCreated {
    work_order_id: serde_json::Value,
}

/// JSON-over-HTTP CMMS client. POSTs to `{base_url}/work-orders`.
pub struct HttpCmmsClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCmmsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CmmsClient for HttpCmmsClient {
    async fn create_work_order(&self, request: &WorkOrderRequest) -> Result<String, DispatchError> {
        let transport = |e: reqwest::Error| DispatchError::Transport {
            service: SERVICE,
            message: e.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/work-orders", self.base_url))
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                service: SERVICE,
                message: format!("HTTP {}: {body}", status.as_u16()),
            });
        }

        let created: WorkOrderCreated = response.json().await.map_err(transport)?;
        work_order_ref(&created.work_order_id).ok_or_else(|| DispatchError::Rejected {
            service: SERVICE,
            message: "response did not include a work_order_id".into(),
        })
    }
}

/// Accept numeric or string work order ids.
fn work_order_ref(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Used when `CMMS_URL` is not set; every work order request fails.
pub struct UnconfiguredCmms;

#[async_trait]
impl CmmsClient for UnconfiguredCmms {
    async fn create_work_order(&self, _request: &WorkOrderRequest) -> Result<String, DispatchError> {
        Err(DispatchError::NotConfigured(SERVICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn work_order_ids_may_be_numbers_or_strings() {
        assert_eq!(work_order_ref(&json!(4411)), Some("4411".into()));
        assert_eq!(work_order_ref(&json!("WO-17")), Some("WO-17".into()));
        assert_eq!(work_order_ref(&json!("")), None);
        assert_eq!(work_order_ref(&json!(null)), None);
    }

    #[test]
    fn request_serializes_wire_fields() {
        let request = WorkOrderRequest {
            organization_id: 3,
            priority: WorkOrderPriority::Critical,
            source_type: WORK_ORDER_SOURCE_TYPE,
            source_id: 12,
            rule_index: 1,
            idempotency_key: idempotency_key(12, 1),
            title: "Equipment Failure TF-000012".into(),
            description: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["priority"], "critical");
        assert_eq!(body["source_type"], "task_feed_post");
        assert_eq!(body["source_id"], 12);
        assert_eq!(body["rule_index"], 1);
        assert_eq!(body["idempotency_key"], "task_feed_post:12:1");
        assert!(body.get("description").is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpCmmsClient::new("http://cmms.local/api/").unwrap();
        assert_eq!(client.base_url, "http://cmms.local/api");
    }
}
