//! Bounded dispatcher: FIFO ready-queue drained by at most
//! `concurrency_limit` concurrent jobs.
//!
//! ```text
//! enqueue(job) ──► [ready queue] ──pump()──► spawn registry.dispatch(job)
//!                        ▲                              │
//!                        └──────── complete() ◄─────────┘
//! ```
//!
//! `pump` is synchronous: it pops while there is capacity and spawns each
//! job. A finished job frees its slot and pumps again. A job id that is
//! already queued or running is rejected, so duplicate change events cannot
//! run the same job twice at once.
//!
//! Must be used inside a tokio runtime.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use reachly_core::types::Job;
use serde::Serialize;
use tokio::sync::Notify;

use crate::registry::{HandlerRegistry, JobOutcome};

/// Dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub queued: usize,
    pub active: usize,
    /// Highest `active` ever observed.
    pub peak_active: usize,
    pub max_concurrent: usize,
    pub enqueued_total: u64,
    pub completed_total: u64,
    pub failed_total: u64,
    pub skipped_duplicates: u64,
}

struct DispatchState {
    queue: VecDeque<Job>,
    queued_ids: HashSet<String>,
    running: HashSet<String>,
    max_concurrent: usize,
    stats: DispatchStats,
}

impl DispatchState {
    fn new(max_concurrent: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued_ids: HashSet::new(),
            running: HashSet::new(),
            max_concurrent,
            stats: DispatchStats {
                max_concurrent,
                ..Default::default()
            },
        }
    }

    fn enqueue(&mut self, job: Job) -> bool {
        if self.queued_ids.contains(&job.id) || self.running.contains(&job.id) {
            self.stats.skipped_duplicates += 1;
            return false;
        }
        self.queued_ids.insert(job.id.clone());
        self.queue.push_back(job);
        self.stats.enqueued_total += 1;
        true
    }

    fn dequeue(&mut self) -> Option<Job> {
        if self.running.len() >= self.max_concurrent {
            return None;
        }
        let job = self.queue.pop_front()?;
        self.queued_ids.remove(&job.id);
        self.running.insert(job.id.clone());
        self.stats.peak_active = self.stats.peak_active.max(self.running.len());
        Some(job)
    }

    fn complete(&mut self, id: &str, outcome: &JobOutcome) {
        self.running.remove(id);
        match outcome {
            JobOutcome::Completed => self.stats.completed_total += 1,
            JobOutcome::Failed(_) => self.stats.failed_total += 1,
            JobOutcome::Skipped => {}
        }
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            queued: self.queue.len(),
            active: self.running.len(),
            ..self.stats.clone()
        }
    }
}

struct Inner {
    state: Mutex<DispatchState>,
    registry: Arc<HandlerRegistry>,
    idle: Notify,
}

/// Cheap to clone; clones share one queue and one concurrency budget.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, concurrency_limit: usize) -> Self {
        let max_concurrent = concurrency_limit.max(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DispatchState::new(max_concurrent)),
                registry,
                idle: Notify::new(),
            }),
        }
    }

    /// Append a ready job and start it if a slot is free.
    /// Returns `false` if the job is already queued or running.
    pub fn enqueue(&self, job: Job) -> bool {
        let id = job.id.clone();
        let accepted = {
            let mut state = self.inner.state.lock();
            let accepted = state.enqueue(job);
            tracing::debug!(
                job_id = %id,
                "📥 Dispatcher enqueue (accepted: {}, queue: {}, active: {})",
                accepted,
                state.queue.len(),
                state.running.len()
            );
            accepted
        };
        if accepted {
            self.pump();
        }
        accepted
    }

    fn pump(&self) {
        loop {
            let Some(job) = self.inner.state.lock().dequeue() else {
                break;
            };
            let this = self.clone();
            tokio::spawn(async move {
                let registry = this.inner.registry.clone();
                let running = job.clone();
                // Run in its own task so a panicking handler still frees the slot.
                let outcome =
                    match tokio::spawn(async move { registry.dispatch(&running).await }).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(job_id = %job.id, "💥 Handler task died: {e}");
                            JobOutcome::Failed(format!("handler task aborted: {e}"))
                        }
                    };
                this.complete(&job.id, &outcome);
            });
        }
    }

    fn complete(&self, id: &str, outcome: &JobOutcome) {
        let idle = {
            let mut state = self.inner.state.lock();
            state.complete(id, outcome);
            state.is_idle()
        };
        self.pump();
        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.state.lock().snapshot()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().is_idle()
    }

    /// Wait until nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.inner.registry
    }
}
