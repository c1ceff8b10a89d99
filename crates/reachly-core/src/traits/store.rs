//! Persistence collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Campaign, Job, JobKind, JobStatus, OutboundMessage, Recipient, SenderCandidate,
};

/// Job storage plus the reads and writes the action handlers need.
///
/// Job status in the store is the source of truth; the engine only mirrors it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs of the given kinds and statuses, ordered by id, strictly after `after_id`.
    /// Keyset pagination keeps pages stable while rows change status.
    async fn fetch_jobs(
        &self,
        kinds: &[JobKind],
        statuses: &[JobStatus],
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Job>>;

    async fn fetch_job(&self, id: &str) -> Result<Option<Job>>;

    /// Insert new jobs. Ids already present are left untouched.
    async fn insert_jobs(&self, jobs: &[Job]) -> Result<()>;

    async fn update_job_status(&self, id: &str, status: JobStatus, error: Option<&str>) -> Result<()>;

    async fn fetch_recipient(&self, id: &str) -> Result<Recipient>;

    /// Remember which sender reached a recipient and when.
    async fn record_contact(&self, recipient_id: &str, sender_identity: &str, at: DateTime<Utc>) -> Result<()>;

    async fn fetch_sender_pool(&self, scope_id: &str) -> Result<Vec<SenderCandidate>>;

    /// Store `message` unless a record with the same external id exists.
    /// Returns the stored record and whether this call inserted it.
    async fn insert_outbound_message_if_absent(&self, message: OutboundMessage) -> Result<(OutboundMessage, bool)>;

    async fn fetch_campaign(&self, id: &str) -> Result<Campaign>;

    /// Contact ids in a list, in insertion order.
    async fn list_members(&self, list_id: &str) -> Result<Vec<String>>;

    /// Add a contact to a list. Adding an existing member is a no-op.
    async fn add_to_contact_list(&self, contact_id: &str, list_id: &str) -> Result<()>;
}
