//! WhatsApp Business Cloud API channel.
//!
//! Each send goes out from the sender's own phone number id with that
//! sender's access token, so one client serves the whole pool.

use std::time::Duration;

use async_trait::async_trait;
use reachly_core::config::WhatsAppApiConfig;
use reachly_core::error::{ReachlyError, Result};
use reachly_core::traits::{MessageSender, OutboundContent, SendReceipt};
use reachly_core::types::SenderCandidate;

/// WhatsApp Business channel implementation.
pub struct WhatsAppChannel {
    api_base: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: &WhatsAppApiConfig) -> Result<Self> {
        if config.api_base.trim().is_empty() {
            return Err(ReachlyError::Config("whatsapp.api_base not configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn messages_url(&self, sender: &SenderCandidate) -> String {
        format!("{}/{}/messages", self.api_base, sender.identity)
    }
}

/// Cloud API request body for one message.
pub fn request_body(to: &str, content: &OutboundContent) -> serde_json::Value {
    match content {
        OutboundContent::Text { body } => serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": body
            }
        }),
        OutboundContent::Template {
            name,
            language,
            components,
        } => {
            let mut template = serde_json::json!({
                "name": name,
                "language": { "code": language }
            });
            let has_components = components.as_array().is_some_and(|c| !c.is_empty());
            if has_components {
                template["components"] = components.clone();
            }
            serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "template",
                "template": template
            })
        }
    }
}

/// Pull `messages[0].id` out of a send response.
pub fn parse_message_id(response: &serde_json::Value) -> Result<String> {
    response["messages"][0]["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ReachlyError::Channel(format!("WhatsApp response without message id: {response}")))
}

#[async_trait]
impl MessageSender for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send(&self, sender: &SenderCandidate, to: &str, content: &OutboundContent) -> Result<SendReceipt> {
        if sender.access_credential.is_empty() {
            return Err(ReachlyError::Validation(format!(
                "sender {} has no access token",
                sender.identity
            )));
        }

        let response = self
            .client
            .post(self.messages_url(sender))
            .bearer_auth(&sender.access_credential)
            .json(&request_body(to, content))
            .send()
            .await
            .map_err(|e| ReachlyError::Channel(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ReachlyError::Channel(format!(
                "WhatsApp API error {}: {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReachlyError::Channel(format!("Invalid WhatsApp response: {e}")))?;
        let external_id = parse_message_id(&result)?;

        tracing::debug!("📤 WhatsApp {} → {} via {}", external_id, to, sender.identity);
        Ok(SendReceipt { external_id })
    }
}
