//! In-memory job store: used by tests and dry runs.
//! Mirrors the SQLite store's semantics, including the change feed.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reachly_core::error::{ReachlyError, Result};
use reachly_core::traits::JobStore;
use reachly_core::types::{
    Campaign, ChangeEvent, ChangeOp, Job, JobKind, JobStatus, OutboundMessage, Recipient,
    SenderCandidate,
};

use crate::listener::{ChangeSender, publish};

#[derive(Default)]
struct Tables {
    jobs: BTreeMap<String, Job>,
    recipients: HashMap<String, Recipient>,
    senders: HashMap<String, Vec<SenderCandidate>>,
    outbound: BTreeMap<String, OutboundMessage>,
    lists: HashMap<String, Vec<String>>,
    campaigns: HashMap<String, Campaign>,
}

/// Process-local [`JobStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    feed: Option<ChangeSender>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish job inserts and updates on `feed`.
    pub fn with_feed(feed: ChangeSender) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            feed: Some(feed),
        }
    }

    pub fn put_recipient(&self, recipient: Recipient) {
        self.tables
            .lock()
            .recipients
            .insert(recipient.id.clone(), recipient);
    }

    pub fn put_sender_pool(&self, scope_id: &str, pool: Vec<SenderCandidate>) {
        self.tables.lock().senders.insert(scope_id.to_string(), pool);
    }

    pub fn put_campaign(&self, campaign: Campaign) {
        self.tables.lock().campaigns.insert(campaign.id.clone(), campaign);
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.tables.lock().jobs.get(id).cloned()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.tables.lock().jobs.values().cloned().collect()
    }

    pub fn outbound_messages(&self) -> Vec<OutboundMessage> {
        self.tables.lock().outbound.values().cloned().collect()
    }

    pub fn recipient(&self, id: &str) -> Option<Recipient> {
        self.tables.lock().recipients.get(id).cloned()
    }

    fn emit(&self, op: ChangeOp, job: Job) {
        if let Some(feed) = &self.feed {
            publish(feed, ChangeEvent::new(op, job));
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn fetch_jobs(
        &self,
        kinds: &[JobKind],
        statuses: &[JobStatus],
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let tables = self.tables.lock();
        let range = match after_id {
            Some(after) => tables
                .jobs
                .range::<str, _>((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded)),
            None => tables.jobs.range::<str, _>(..),
        };
        Ok(range
            .map(|(_, job)| job)
            .filter(|job| kinds.contains(&job.kind) && statuses.contains(&job.status))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.job(id))
    }

    async fn insert_jobs(&self, jobs: &[Job]) -> Result<()> {
        let mut inserted = Vec::new();
        {
            let mut tables = self.tables.lock();
            for job in jobs {
                if !tables.jobs.contains_key(&job.id) {
                    tables.jobs.insert(job.id.clone(), job.clone());
                    inserted.push(job.clone());
                }
            }
        }
        for job in inserted {
            self.emit(ChangeOp::Insert, job);
        }
        Ok(())
    }

    async fn update_job_status(&self, id: &str, status: JobStatus, error: Option<&str>) -> Result<()> {
        let updated = {
            let mut tables = self.tables.lock();
            let job = tables
                .jobs
                .get_mut(id)
                .ok_or_else(|| ReachlyError::NotFound(format!("job {id}")))?;
            job.status = status;
            job.error = error.map(str::to_string);
            job.clone()
        };
        self.emit(ChangeOp::Update, updated);
        Ok(())
    }

    async fn fetch_recipient(&self, id: &str) -> Result<Recipient> {
        self.recipient(id)
            .ok_or_else(|| ReachlyError::NotFound(format!("recipient {id}")))
    }

    async fn record_contact(&self, recipient_id: &str, sender_identity: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock();
        let recipient = tables
            .recipients
            .get_mut(recipient_id)
            .ok_or_else(|| ReachlyError::NotFound(format!("recipient {recipient_id}")))?;
        recipient.last_sender = Some(sender_identity.to_string());
        recipient.last_contacted_at = Some(at);
        Ok(())
    }

    async fn fetch_sender_pool(&self, scope_id: &str) -> Result<Vec<SenderCandidate>> {
        Ok(self
            .tables
            .lock()
            .senders
            .get(scope_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_outbound_message_if_absent(&self, message: OutboundMessage) -> Result<(OutboundMessage, bool)> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.outbound.get(&message.external_id) {
            return Ok((existing.clone(), false));
        }
        tables
            .outbound
            .insert(message.external_id.clone(), message.clone());
        Ok((message, true))
    }

    async fn fetch_campaign(&self, id: &str) -> Result<Campaign> {
        self.tables
            .lock()
            .campaigns
            .get(id)
            .cloned()
            .ok_or_else(|| ReachlyError::NotFound(format!("campaign {id}")))
    }

    async fn list_members(&self, list_id: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .lists
            .get(list_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_to_contact_list(&self, contact_id: &str, list_id: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        let members = tables.lists.entry(list_id.to_string()).or_default();
        if !members.iter().any(|m| m == contact_id) {
            members.push(contact_id.to_string());
        }
        Ok(())
    }
}
