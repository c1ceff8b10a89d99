//! # Reachly Core
//!
//! Shared data model, configuration, errors and the collaborator traits
//! (`JobStore`, `MessageSender`) that the scheduling engine is written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::ReachlyConfig;
pub use error::{ReachlyError, Result};
pub use traits::{JobStore, MessageSender, OutboundContent, SendReceipt};
pub use types::{
    actions, Campaign, ChangeEvent, ChangeOp, Job, JobKind, JobStatus, JobTable, MembershipRule,
    OutboundMessage, QualityRating, Recipient, SenderCandidate, TemplateRef,
};
