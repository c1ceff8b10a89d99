//! Collaborator traits the engine is written against.

pub mod messenger;
pub mod store;

pub use messenger::{MessageSender, OutboundContent, SendReceipt};
pub use store::JobStore;
