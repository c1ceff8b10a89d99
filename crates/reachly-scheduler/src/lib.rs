//! # Reachly Scheduler
//!
//! Delayed job scheduling and bounded execution for campaign sends and
//! workflow automations.
//!
//! ## Design Principles
//! - Single process: one dispatcher owns the ready queue and the concurrency budget
//! - Tokio timers only, no polling; the store pushes row changes
//! - Job status in the store is the source of truth
//! - At-least-once: jobs left `PROCESSING` by a crash run again, the
//!   outbound message id keeps the record single
//!
//! ## Architecture
//! ```text
//! Store change feed ──► ChangeListener ──► Scheduler.schedule(job)
//! Boot ──► reconcile() ──────────────────┘        │
//!                                                 ├── due now  ──┐
//!                                                 └── timer ─────┤
//!                                                                ▼
//!                                   Dispatcher (FIFO, ≤ concurrency_limit)
//!                                                                │
//!                                   HandlerRegistry.dispatch(job)
//!                                     ├── send-template ─┐
//!                                     ├── send-message ──┼── SenderSelector
//!                                     │                  ├── TemplateRenderer
//!                                     │                  └── RetryExecutor → MessageSender
//!                                     ├── add-to-contact-list
//!                                     └── campaign-fanout → CampaignLog jobs → store
//! ```

pub mod dispatch;
pub mod engine;
pub mod fanout;
pub mod handlers;
pub mod listener;
pub mod persistence;
pub mod phone;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod sender;
pub mod store;
pub mod template;
pub mod workflow;

pub use dispatch::{DispatchStats, Dispatcher};
pub use engine::Engine;
pub use listener::{change_feed, spawn_change_listener, ChangeReceiver, ChangeSender};
pub use persistence::SqliteStore;
pub use reconcile::{reconcile, ReconcileReport};
pub use registry::{ActionHandler, HandlerContext, HandlerRegistry, JobOutcome};
pub use retry::RetryExecutor;
pub use schedule::{Scheduled, Scheduler};
pub use sender::{SenderLease, SenderSelector, WeightedPool};
pub use store::MemoryStore;
pub use template::TemplateRenderer;
pub use workflow::{AutomationEngine, AutomationRule, InboundEvent, MatchMode, RuleAction, RuleTrigger};
