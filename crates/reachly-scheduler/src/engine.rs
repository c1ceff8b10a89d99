//! Engine: wires retry, sender selection, handlers, dispatcher and scheduler
//! behind the entry points the application calls.

use std::sync::Arc;

use reachly_core::config::EngineConfig;
use reachly_core::error::Result;
use reachly_core::traits::{JobStore, MessageSender};
use reachly_core::types::Job;
use tokio::task::JoinHandle;

use crate::dispatch::{DispatchStats, Dispatcher};
use crate::listener::{spawn_change_listener, ChangeReceiver};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::registry::{ActionHandler, HandlerContext, HandlerRegistry};
use crate::retry::RetryExecutor;
use crate::schedule::{Scheduled, Scheduler};
use crate::sender::SenderSelector;
use crate::template::TemplateRenderer;
use crate::workflow::{AutomationEngine, InboundEvent};

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    scheduler: Scheduler,
    retry: RetryExecutor,
}

impl Engine {
    /// Build an engine with the built-in handlers registered.
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn JobStore>,
        messenger: Arc<dyn MessageSender>,
    ) -> Result<Self> {
        let retry = RetryExecutor::from_config(config);
        let ctx = HandlerContext {
            store: store.clone(),
            messenger,
            selector: Arc::new(SenderSelector::new()),
            renderer: Arc::new(TemplateRenderer::new()?),
            retry,
        };
        let registry = Arc::new(HandlerRegistry::with_builtin(ctx));
        let dispatcher = Dispatcher::new(registry.clone(), config.concurrency_limit);
        tracing::info!(
            "⚙️ Engine ready: concurrency {}, {} retr(ies) from {}ms",
            config.concurrency_limit,
            config.max_retries,
            config.retry_base_delay_ms
        );
        Ok(Self {
            config: config.clone(),
            store,
            registry,
            scheduler: Scheduler::new(dispatcher),
            retry,
        })
    }

    /// Persist a new job and schedule it.
    pub async fn submit(&self, job: Job) -> Result<Scheduled> {
        let store = &self.store;
        self.retry
            .run("insert job", || store.insert_jobs(std::slice::from_ref(&job)))
            .await?;
        tracing::debug!(job_id = %job.id, "📝 Submitted {} ({})", job.action, job.kind);
        Ok(self.scheduler.schedule(job))
    }

    /// Persist and schedule several jobs in one store write.
    pub async fn submit_all(&self, jobs: Vec<Job>) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }
        let store = &self.store;
        self.retry
            .run("insert jobs", || store.insert_jobs(&jobs))
            .await?;
        let count = jobs.len();
        for job in jobs {
            self.scheduler.schedule(job);
        }
        Ok(count)
    }

    /// Run an inbound event through the automation rules and submit the jobs.
    pub async fn handle_event(&self, automation: &AutomationEngine, event: &InboundEvent) -> Result<usize> {
        let jobs = automation.evaluate(event, chrono::Utc::now());
        self.submit_all(jobs).await
    }

    /// Re-arm jobs a previous process left unfinished. Call once at boot.
    pub async fn start_reconciliation(&self) -> Result<ReconcileReport> {
        reconcile(
            self.store.as_ref(),
            &self.scheduler,
            &self.retry,
            self.config.reconcile_batch_size,
        )
        .await
    }

    /// Consume a change feed until it closes.
    pub fn listen(&self, rx: ChangeReceiver) -> JoinHandle<()> {
        spawn_change_listener(rx, self.scheduler.clone())
    }

    pub fn register_handler(&self, handler: Arc<dyn ActionHandler>) {
        self.registry.register(handler);
    }

    pub fn dispatcher_stats(&self) -> DispatchStats {
        self.scheduler.dispatcher().stats()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Wait for the ready queue to drain. Armed timers are not waited for.
    pub async fn wait_idle(&self) {
        self.scheduler.dispatcher().wait_idle().await;
    }

    /// Disarm timers, then let running jobs finish.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.wait_idle().await;
        let stats = self.dispatcher_stats();
        tracing::info!(
            "👋 Engine stopped: {} completed, {} failed",
            stats.completed_total,
            stats.failed_total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::NullMessenger;
    use crate::store::MemoryStore;
    use reachly_core::types::{actions, JobKind, JobStatus};

    fn engine(store: Arc<MemoryStore>) -> Engine {
        let config = EngineConfig {
            max_retries: 0,
            ..Default::default()
        };
        Engine::new(&config, store, Arc::new(NullMessenger)).unwrap()
    }

    #[tokio::test]
    async fn test_submit_persists_and_runs() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let job = Job::new(
            JobKind::WorkflowLog,
            actions::ADD_TO_CONTACT_LIST,
            serde_json::json!({"contact_id": "c-1", "list_id": "l-1"}),
        );
        let id = job.id.clone();

        assert_eq!(engine.submit(job).await.unwrap(), Scheduled::Dispatched);
        engine.wait_idle().await;

        assert_eq!(store.job(&id).unwrap().status, JobStatus::Completed);
        assert_eq!(engine.dispatcher_stats().completed_total, 1);
    }

    #[tokio::test]
    async fn test_missing_recipient_marks_failed() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let job = Job::new(
            JobKind::WorkflowLog,
            actions::SEND_MESSAGE,
            serde_json::json!({"recipient_id": "ghost", "scope_id": "p", "body": "hi"}),
        );
        let id = job.id.clone();
        engine.submit(job).await.unwrap();
        engine.wait_idle().await;

        let stored = store.job(&id).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error.unwrap().contains("recipient ghost"));
    }
}
