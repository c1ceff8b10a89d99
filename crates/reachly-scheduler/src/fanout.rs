//! Campaign fan-out: one campaign → one `CampaignLog` job per recipient.
//!
//! Audience = expand(inclusions) − expand(exclusions), de-duplicated by
//! contact id in first-seen order. Log job ids are derived from the
//! campaign and contact, so running the same fan-out twice inserts nothing new.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reachly_core::error::Result;
use reachly_core::traits::JobStore;
use reachly_core::types::{
    actions, Campaign, CampaignFanoutPayload, Job, JobKind, MembershipRule, SendTemplatePayload,
};

use crate::registry::{ActionHandler, HandlerContext};
use crate::retry::RetryExecutor;

/// Contact ids matched by a set of rules, duplicates removed.
pub async fn expand_rules(
    store: &dyn JobStore,
    retry: &RetryExecutor,
    rules: &[MembershipRule],
) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut contacts = Vec::new();
    for rule in rules {
        let ids = match rule {
            MembershipRule::Contact(id) => vec![id.clone()],
            MembershipRule::ContactList(list_id) => {
                retry
                    .run("list members", || store.list_members(list_id))
                    .await?
            }
        };
        for id in ids {
            if seen.insert(id.clone()) {
                contacts.push(id);
            }
        }
    }
    Ok(contacts)
}

/// Included contacts minus excluded ones, order preserved.
pub fn audience(included: Vec<String>, excluded: &[String]) -> Vec<String> {
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    included
        .into_iter()
        .filter(|id| !excluded.contains(id.as_str()) && seen.insert(id.clone()))
        .collect()
}

/// Stable id of the log job for (campaign, contact).
pub fn campaign_log_id(campaign_id: &str, contact_id: &str) -> String {
    format!("{campaign_id}:{contact_id}")
}

/// Build the per-recipient `send-template` jobs.
pub fn campaign_log_jobs(campaign: &Campaign, recipients: &[String], now: DateTime<Utc>) -> Result<Vec<Job>> {
    let trigger_time = campaign.send_at.unwrap_or(now);
    recipients
        .iter()
        .map(|contact_id| -> Result<Job> {
            let payload = SendTemplatePayload {
                recipient_id: contact_id.clone(),
                scope_id: campaign.scope_id.clone(),
                template: campaign.template.clone(),
                personalization: campaign.personalization.clone(),
            };
            Ok(Job::new(JobKind::CampaignLog, actions::SEND_TEMPLATE, serde_json::to_value(payload)?)
                .with_id(campaign_log_id(&campaign.id, contact_id))
                .at(trigger_time))
        })
        .collect()
}

/// `campaign-fanout`: expand the audience and insert the log jobs.
/// The store's change feed hands the new jobs to the scheduler.
pub struct CampaignFanoutHandler;

#[async_trait]
impl ActionHandler for CampaignFanoutHandler {
    fn action(&self) -> &str {
        actions::CAMPAIGN_FANOUT
    }

    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()> {
        let payload: CampaignFanoutPayload = job.payload_as()?;
        let store = ctx.store.as_ref();
        let campaign = ctx
            .retry
            .run("fetch campaign", || store.fetch_campaign(&payload.campaign_id))
            .await?;

        let included = expand_rules(store, &ctx.retry, &campaign.inclusions).await?;
        let excluded = expand_rules(store, &ctx.retry, &campaign.exclusions).await?;
        let recipients = audience(included, &excluded);
        let jobs = campaign_log_jobs(&campaign, &recipients, Utc::now())?;

        ctx.retry
            .run("insert campaign logs", || store.insert_jobs(&jobs))
            .await?;
        tracing::info!(
            job_id = %job.id,
            "📣 Campaign {} fanned out to {} recipient(s) ({} excluded)",
            campaign.id,
            recipients.len(),
            excluded.len()
        );
        Ok(())
    }
}
