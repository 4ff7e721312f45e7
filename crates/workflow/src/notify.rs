//! Personnel alert collaborator.

use async_trait::async_trait;
use serde::Serialize;
use taskfeed_core::post::Post;
use taskfeed_core::rules::WorkflowRule;
use taskfeed_core::types::DbId;
use taskfeed_events::delivery::webhook::WebhookError;
use taskfeed_events::WebhookDelivery;

use crate::error::DispatchError;

const SERVICE: &str = "alert webhook";

/// Alert sent when an `alert_personnel` rule fires.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRequest {
    pub organization_id: DbId,
    pub post_id: DbId,
    pub post_number: String,
    pub template_name: String,
    pub personnel_ids: Vec<DbId>,
    pub message: String,
}

impl AlertRequest {
    pub fn for_rule(post: &Post, rule: &WorkflowRule) -> Self {
        let template_name = post.template_snapshot.name().to_string();
        let message = rule
            .message
            .clone()
            .unwrap_or_else(|| format!("{template_name} {} requires attention", post.post_number));
        Self {
            organization_id: post.organization_id,
            post_id: post.id,
            post_number: post.post_number.clone(),
            template_name,
            personnel_ids: rule.alert_personnel_ids.clone(),
            message,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn alert_personnel(&self, alert: &AlertRequest) -> Result<(), DispatchError>;
}

/// Posts alerts as JSON to a webhook, with retry.
pub struct WebhookNotifier {
    delivery: WebhookDelivery,
    url: String,
}

impl WebhookNotifier {
    pub fn new(delivery: WebhookDelivery, url: impl Into<String>) -> Self {
        Self {
            delivery,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn alert_personnel(&self, alert: &AlertRequest) -> Result<(), DispatchError> {
        let payload = serde_json::json!({
            "event_type": "task_feed.alert_personnel",
            "payload": alert,
        });
        self.delivery
            .deliver(&self.url, &payload)
            .await
            .map_err(|e| match e {
                WebhookError::HttpStatus(status) => DispatchError::Rejected {
                    service: SERVICE,
                    message: format!("HTTP {status}"),
                },
                WebhookError::Request(e) => DispatchError::Transport {
                    service: SERVICE,
                    message: e.to_string(),
                },
            })
    }
}

/// Used when no alert channel is configured; every alert fails.
pub struct UnconfiguredNotifier;

#[async_trait]
impl Notifier for UnconfiguredNotifier {
    async fn alert_personnel(&self, _alert: &AlertRequest) -> Result<(), DispatchError> {
        Err(DispatchError::NotConfigured(SERVICE))
    }
}
