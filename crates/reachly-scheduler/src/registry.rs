//! Handler registry: routes a job to the handler registered for its action
//! and owns the job's status transitions while it runs.
//!
//! ```text
//! dispatch(job)
//!   ├── re-read job ── missing / terminal ──► Skipped
//!   ├── mark PROCESSING
//!   ├── handler(job, ctx)
//!   │     ├── Ok  ──► COMPLETED
//!   │     └── Err ──► FAILED (error recorded on the job)
//!   └── no handler ──► FAILED
//! ```
//!
//! Status writes go through the retry executor; if they still fail the
//! error is logged and the job carries on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reachly_core::error::Result;
use reachly_core::traits::{JobStore, MessageSender};
use reachly_core::types::{Job, JobStatus};

use crate::retry::RetryExecutor;
use crate::sender::SenderSelector;
use crate::template::TemplateRenderer;

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: Arc<dyn JobStore>,
    pub messenger: Arc<dyn MessageSender>,
    pub selector: Arc<SenderSelector>,
    pub renderer: Arc<TemplateRenderer>,
    pub retry: RetryExecutor,
}

/// Performs the side effects of one job action.
///
/// Handlers validate first and return [`ReachlyError::Validation`] without
/// retrying; only network and persistence calls go through `ctx.retry`.
///
/// [`ReachlyError::Validation`]: reachly_core::error::ReachlyError::Validation
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Action name this handler serves, e.g. `send-template`.
    fn action(&self) -> &str;

    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()>;
}

/// How a dispatched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    /// Job vanished or was already terminal; nothing ran.
    Skipped,
}

pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
    ctx: HandlerContext,
}

impl HandlerRegistry {
    pub fn new(ctx: HandlerContext) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            ctx,
        }
    }

    /// Registry with the built-in send, contact-list and fan-out handlers.
    pub fn with_builtin(ctx: HandlerContext) -> Self {
        let registry = Self::new(ctx);
        for handler in crate::handlers::builtin() {
            registry.register(handler);
        }
        registry
    }

    /// Register a handler, replacing any previous one for the same action.
    pub fn register(&self, handler: Arc<dyn ActionHandler>) {
        let action = handler.action().to_string();
        if self.handlers.write().insert(action.clone(), handler).is_some() {
            tracing::warn!("🔁 Handler for '{}' replaced", action);
        } else {
            tracing::debug!("🧩 Handler registered: {}", action);
        }
    }

    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.handlers.read().keys().cloned().collect();
        actions.sort();
        actions
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    pub async fn dispatch(&self, job: &Job) -> JobOutcome {
        let store = &self.ctx.store;
        let retry = &self.ctx.retry;

        let current = match retry.run("fetch job", || store.fetch_job(&job.id)).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                tracing::warn!(job_id = %job.id, "⚠️ Job no longer exists, skipping");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                // Store unreachable: run from the in-memory copy.
                tracing::warn!(job_id = %job.id, "⚠️ Could not re-read job ({e}), using queued copy");
                job.clone()
            }
        };
        if current.status.is_terminal() {
            tracing::debug!(job_id = %job.id, "⏭️ Job already {}, skipping", current.status);
            return JobOutcome::Skipped;
        }

        self.mark(&current.id, JobStatus::Processing, None).await;

        let handler = self.handlers.read().get(&current.action).cloned();
        let outcome = match handler {
            None => JobOutcome::Failed(format!(
                "no handler registered for action '{}'",
                current.action
            )),
            Some(handler) => match handler.handle(&current, &self.ctx).await {
                Ok(()) => JobOutcome::Completed,
                Err(e) => JobOutcome::Failed(e.to_string()),
            },
        };

        match &outcome {
            JobOutcome::Completed => {
                tracing::info!(job_id = %current.id, "✅ {} completed", current.action);
                self.mark(&current.id, JobStatus::Completed, None).await;
            }
            JobOutcome::Failed(reason) => {
                tracing::warn!(job_id = %current.id, "❌ {} failed: {}", current.action, reason);
                self.mark(&current.id, JobStatus::Failed, Some(reason.as_str())).await;
            }
            JobOutcome::Skipped => {}
        }
        outcome
    }

    async fn mark(&self, id: &str, status: JobStatus, error: Option<&str>) {
        let store = &self.ctx.store;
        let op_name = format!("mark {id} {status}");
        if let Err(e) = self
            .ctx
            .retry
            .run(&op_name, || store.update_job_status(id, status, error))
            .await
        {
            tracing::error!(job_id = %id, "💥 Status write {} lost: {}", status, e);
        }
    }
}
