use axum::extract::ws::Message;
use serde::Serialize;
use taskfeed_core::types::DbId;

/// Messages pushed from the server to browser clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Cached queries under these keys are stale and must be re-fetched.
    Invalidate { targets: Vec<String> },
    /// A post was created in the client's organization.
    PostCreated {
        post_id: DbId,
        post_number: String,
        template_name: Option<String>,
    },
}

impl ServerMessage {
    pub fn to_message(&self) -> Message {
        // Serializing a plain enum of strings and integers cannot fail.
        let text = serde_json::to_string(self).unwrap_or_default();
        Message::Text(text.into())
    }
}
