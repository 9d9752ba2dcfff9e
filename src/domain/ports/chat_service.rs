//! Port for the chat/notification service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ports::errors::CollaboratorError;

/// Structured message payload. Blocks are opaque to the core; the chat
/// adapter decides how to render them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<serde_json::Value>,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: Vec::new(),
        }
    }

    pub fn with_block(mut self, block: serde_json::Value) -> Self {
        self.blocks.push(block);
        self
    }
}

/// Delivery target for reports, alerts, and diagnostics.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Post a message to a channel, returning the delivered message id.
    async fn post_message(
        &self,
        channel: &str,
        payload: MessagePayload,
    ) -> Result<String, CollaboratorError>;
}
