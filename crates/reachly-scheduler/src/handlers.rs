//! Built-in action handlers.
//!
//! Send handlers run the same pipeline:
//! recipient → phone check → sender pool → sender choice → render → send
//! → outbound record (idempotent on the API message id) → contact bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reachly_core::error::Result;
use reachly_core::traits::OutboundContent;
use reachly_core::types::{
    actions, AddToContactListPayload, Job, OutboundMessage, Recipient, SendMessagePayload,
    SendTemplatePayload, TemplateRef,
};

use crate::fanout::CampaignFanoutHandler;
use crate::phone::normalize_phone;
use crate::registry::{ActionHandler, HandlerContext};
use crate::template::TemplateRenderer;

/// Handlers registered on every engine.
pub fn builtin() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(SendTemplateHandler),
        Arc::new(SendMessageHandler),
        Arc::new(AddToContactListHandler),
        Arc::new(CampaignFanoutHandler),
    ]
}

/// What to render for one recipient.
enum Draft<'a> {
    Template(&'a TemplateRef),
    Text(&'a str),
}

impl Draft<'_> {
    fn render(
        &self,
        renderer: &TemplateRenderer,
        recipient: &Recipient,
        vars: &HashMap<String, String>,
    ) -> OutboundContent {
        let now = Utc::now();
        match self {
            Draft::Template(template) => OutboundContent::Template {
                name: template.name.clone(),
                language: template.language.clone(),
                components: renderer.render_value(&template.components, recipient, vars, now),
            },
            Draft::Text(body) => OutboundContent::Text {
                body: renderer.render(body, recipient, vars, now),
            },
        }
    }
}

async fn deliver(
    job: &Job,
    ctx: &HandlerContext,
    recipient_id: &str,
    scope_id: &str,
    draft: Draft<'_>,
    vars: &HashMap<String, String>,
) -> Result<()> {
    let store = &ctx.store;

    let recipient = ctx
        .retry
        .run("fetch recipient", || store.fetch_recipient(recipient_id))
        .await?;
    let to = normalize_phone(&recipient.phone)?;

    let pool = ctx
        .retry
        .run("fetch sender pool", || store.fetch_sender_pool(scope_id))
        .await?;
    // Held until the contact is recorded so concurrent first sends agree.
    let lease = ctx.selector.select(&pool, &recipient)?;
    let sender = &lease.candidate;
    let content = draft.render(&ctx.renderer, &recipient, vars);

    let receipt = ctx
        .retry
        .run("send message", || ctx.messenger.send(sender, &to, &content))
        .await?;
    tracing::info!(
        job_id = %job.id,
        "📤 Sent to {} via {} ({}): {}",
        recipient.id,
        sender.identity,
        ctx.messenger.name(),
        receipt.external_id
    );

    let sent_at = Utc::now();
    let record = OutboundMessage {
        external_id: receipt.external_id.clone(),
        job_id: job.id.clone(),
        recipient_id: recipient.id.clone(),
        sender_identity: sender.identity.clone(),
        content: content.summary(),
        sent_at,
    };
    let (_, inserted) = ctx
        .retry
        .run("store outbound message", || {
            store.insert_outbound_message_if_absent(record.clone())
        })
        .await?;
    if !inserted {
        tracing::debug!(job_id = %job.id, "♻️ Outbound {} already recorded", receipt.external_id);
    }

    ctx.retry
        .run("record contact", || {
            store.record_contact(&recipient.id, &sender.identity, sent_at)
        })
        .await?;
    Ok(())
}

/// `send-template`: approved template with rendered components.
pub struct SendTemplateHandler;

#[async_trait]
impl ActionHandler for SendTemplateHandler {
    fn action(&self) -> &str {
        actions::SEND_TEMPLATE
    }

    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()> {
        let payload: SendTemplatePayload = job.payload_as()?;
        deliver(
            job,
            ctx,
            &payload.recipient_id,
            &payload.scope_id,
            Draft::Template(&payload.template),
            &payload.personalization,
        )
        .await
    }
}

/// `send-message`: free text with placeholders and spintax.
pub struct SendMessageHandler;

#[async_trait]
impl ActionHandler for SendMessageHandler {
    fn action(&self) -> &str {
        actions::SEND_MESSAGE
    }

    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()> {
        let payload: SendMessagePayload = job.payload_as()?;
        deliver(
            job,
            ctx,
            &payload.recipient_id,
            &payload.scope_id,
            Draft::Text(&payload.body),
            &payload.personalization,
        )
        .await
    }
}

/// `add-to-contact-list`: membership change only.
pub struct AddToContactListHandler;

#[async_trait]
impl ActionHandler for AddToContactListHandler {
    fn action(&self) -> &str {
        actions::ADD_TO_CONTACT_LIST
    }

    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()> {
        let payload: AddToContactListPayload = job.payload_as()?;
        let store = &ctx.store;
        ctx.retry
            .run("add to contact list", || {
                store.add_to_contact_list(&payload.contact_id, &payload.list_id)
            })
            .await?;
        tracing::info!(job_id = %job.id, "📋 {} added to list {}", payload.contact_id, payload.list_id);
        Ok(())
    }
}
