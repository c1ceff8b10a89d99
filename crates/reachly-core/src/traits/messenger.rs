//! Outbound messaging collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::SenderCandidate;

/// What to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundContent {
    Text { body: String },
    Template {
        name: String,
        language: String,
        components: serde_json::Value,
    },
}

impl OutboundContent {
    /// Short text kept on the outbound message record.
    pub fn summary(&self) -> String {
        match self {
            OutboundContent::Text { body } => body.clone(),
            OutboundContent::Template { name, language, .. } => format!("template:{name}/{language}"),
        }
    }
}

/// Acknowledgement from the messaging API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Message id assigned by the API (`wamid.*` for WhatsApp).
    pub external_id: String,
}

/// Sends one message from one sender identity.
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn name(&self) -> &str;

    /// `to` is the normalized recipient phone number (digits only).
    async fn send(&self, sender: &SenderCandidate, to: &str, content: &OutboundContent) -> Result<SendReceipt>;
}
