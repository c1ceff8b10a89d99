//! Data model for jobs, recipients, senders and campaigns.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ReachlyError, Result};

/// Action names understood by the built-in handlers.
pub mod actions {
    pub const SEND_TEMPLATE: &str = "send-template";
    pub const SEND_MESSAGE: &str = "send-message";
    pub const ADD_TO_CONTACT_LIST: &str = "add-to-contact-list";
    pub const CAMPAIGN_FANOUT: &str = "campaign-fanout";
}

/// Which family of rows a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// One campaign waiting to be expanded into per-recipient logs.
    CampaignFanout,
    /// One recipient of an activated campaign.
    CampaignLog,
    /// One (automation action, contact) pair.
    WorkflowLog,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::CampaignFanout, JobKind::CampaignLog, JobKind::WorkflowLog];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CampaignFanout => "campaign_fanout",
            JobKind::CampaignLog => "campaign_log",
            JobKind::WorkflowLog => "workflow_log",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ReachlyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "campaign_fanout" => Ok(JobKind::CampaignFanout),
            "campaign_log" => Ok(JobKind::CampaignLog),
            "workflow_log" => Ok(JobKind::WorkflowLog),
            other => Err(ReachlyError::Validation(format!("unknown job kind '{other}'"))),
        }
    }
}

/// Job lifecycle: `PENDING → PROCESSING → {COMPLETED | FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Statuses re-armed at boot. `PROCESSING` means a previous process died mid-job.
    pub const RECONCILABLE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ReachlyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(ReachlyError::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// A unit of deferred, retryable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Handler name, e.g. `send-template`.
    pub action: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// The job is eligible at or after this instant.
    pub trigger_time: DateTime<Utc>,
    /// Error detail recorded when the job failed.
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a pending job that is due immediately.
    pub fn new(kind: JobKind, action: &str, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            action: action.to_string(),
            payload,
            status: JobStatus::Pending,
            trigger_time: now,
            error: None,
            created_at: now,
        }
    }

    /// Set the trigger time.
    pub fn at(mut self, trigger_time: DateTime<Utc>) -> Self {
        self.trigger_time = trigger_time;
        self
    }

    /// Trigger after `delay` from now.
    pub fn delayed(mut self, delay: std::time::Duration) -> Self {
        self.trigger_time = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Time left until the trigger, or `None` if already due.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.trigger_time - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Decode the payload. A payload that does not fit is a permanent failure.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            ReachlyError::Validation(format!("invalid '{}' payload: {e}", self.action))
        })
    }
}

/// Reference to a pre-approved WhatsApp message template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Cloud API `components` array; string values may carry placeholders.
    #[serde(default)]
    pub components: serde_json::Value,
}

fn default_language() -> String { "en_US".into() }

/// Payload of `send-template` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTemplatePayload {
    pub recipient_id: String,
    /// Project owning the sender pool.
    pub scope_id: String,
    pub template: TemplateRef,
    #[serde(default)]
    pub personalization: HashMap<String, String>,
}

/// Payload of `send-message` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub recipient_id: String,
    pub scope_id: String,
    pub body: String,
    #[serde(default)]
    pub personalization: HashMap<String, String>,
}

/// Payload of `add-to-contact-list` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToContactListPayload {
    pub contact_id: String,
    pub list_id: String,
}

/// Payload of `campaign-fanout` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignFanoutPayload {
    pub campaign_id: String,
}

/// A contact that can receive messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub phone: String,
    pub scope_id: String,
    /// Sender identity used for the last message, if any.
    #[serde(default)]
    pub last_sender: Option<String>,
    #[serde(default)]
    pub last_contacted_at: Option<DateTime<Utc>>,
}

/// Meta's quality rating for a business phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityRating {
    Green,
    Yellow,
    Red,
    #[serde(other)]
    Unknown,
}

impl QualityRating {
    /// Selection weight: healthier numbers carry more traffic.
    pub fn weight(&self) -> u32 {
        match self {
            QualityRating::Green => 6,
            QualityRating::Yellow => 3,
            QualityRating::Red | QualityRating::Unknown => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityRating::Green => "GREEN",
            QualityRating::Yellow => "YELLOW",
            QualityRating::Red => "RED",
            QualityRating::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GREEN" => QualityRating::Green,
            "YELLOW" => QualityRating::Yellow,
            "RED" => QualityRating::Red,
            _ => QualityRating::Unknown,
        }
    }
}

/// A sender identity eligible for a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderCandidate {
    /// Cloud API phone-number id.
    pub identity: String,
    pub quality_rating: QualityRating,
    /// Bearer token for the Cloud API.
    pub access_credential: String,
}

/// A message that left the system, keyed by the id the API gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub external_id: String,
    pub job_id: String,
    pub recipient_id: String,
    pub sender_identity: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Campaign audience rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MembershipRule {
    Contact(String),
    ContactList(String),
}

/// A bulk send: template plus inclusion/exclusion rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub scope_id: String,
    pub template: TemplateRef,
    #[serde(default)]
    pub inclusions: Vec<MembershipRule>,
    #[serde(default)]
    pub exclusions: Vec<MembershipRule>,
    /// When the per-recipient sends become eligible. `None` = immediately.
    #[serde(default)]
    pub send_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub personalization: HashMap<String, String>,
}

/// Table a change event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTable {
    CampaignFanouts,
    CampaignLogs,
    WorkflowLogs,
}

impl From<JobKind> for JobTable {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::CampaignFanout => JobTable::CampaignFanouts,
            JobKind::CampaignLog => JobTable::CampaignLogs,
            JobKind::WorkflowLog => JobTable::WorkflowLogs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
}

/// A row-level change on a job table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: JobTable,
    pub op: ChangeOp,
    pub job: Job,
}

impl ChangeEvent {
    pub fn new(op: ChangeOp, job: Job) -> Self {
        Self {
            table: JobTable::from(job.kind),
            op,
            job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&JobStatus::Pending).unwrap(), "\"PENDING\"");
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"PROCESSING\"").unwrap(),
            JobStatus::Processing
        );
        assert_eq!("FAILED".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("DONE".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_quality_weights() {
        assert_eq!(QualityRating::Green.weight(), 6);
        assert_eq!(QualityRating::Yellow.weight(), 3);
        assert_eq!(QualityRating::Red.weight(), 1);
        assert_eq!(QualityRating::parse("flagged"), QualityRating::Unknown);
        assert_eq!(QualityRating::Unknown.weight(), 1);
        let unknown: QualityRating = serde_json::from_str("\"NA\"").unwrap();
        assert_eq!(unknown, QualityRating::Unknown);
    }

    #[test]
    fn test_delay_from() {
        let now = Utc::now();
        let due = Job::new(JobKind::WorkflowLog, actions::SEND_MESSAGE, serde_json::json!({}))
            .at(now - chrono::Duration::seconds(3));
        assert!(due.delay_from(now).is_none());

        let later = due.clone().at(now + chrono::Duration::seconds(5));
        assert_eq!(later.delay_from(now), Some(std::time::Duration::from_secs(5)));

        let exact = due.at(now);
        assert!(exact.delay_from(now).is_none());
    }

    #[test]
    fn test_bad_payload_is_validation_error() {
        let job = Job::new(
            JobKind::CampaignLog,
            actions::SEND_TEMPLATE,
            serde_json::json!({"recipient_id": 5}),
        );
        let err = job.payload_as::<SendTemplatePayload>().unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_membership_rule_format() {
        let rule: MembershipRule =
            serde_json::from_value(serde_json::json!({"type": "contact_list", "id": "l-1"})).unwrap();
        assert_eq!(rule, MembershipRule::ContactList("l-1".into()));
    }

    #[test]
    fn test_change_event_table() {
        let job = Job::new(JobKind::CampaignLog, actions::SEND_TEMPLATE, serde_json::json!({}));
        let event = ChangeEvent::new(ChangeOp::Insert, job);
        assert_eq!(event.table, JobTable::CampaignLogs);
    }
}
