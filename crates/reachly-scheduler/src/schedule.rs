//! Scheduler: arms one timer per job id and hands due jobs to the dispatcher.
//!
//! ```text
//! schedule(job)
//!   ├── terminal            → ignored
//!   ├── already armed       → no-op (same trigger time)
//!   ├── trigger ≤ now       → dispatcher.enqueue(job) right away
//!   └── trigger > now       → sleep(delay) → dispatcher.enqueue(job)
//!
//! cancel(id)                → abort the armed timer, if any
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reachly_core::types::{ChangeEvent, Job, JobStatus};
use tokio::task::AbortHandle;

use crate::dispatch::Dispatcher;

/// What `schedule` did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// Due now; handed to the dispatcher (which may still reject a duplicate).
    Dispatched,
    /// Timer armed.
    Armed,
    /// A timer for this id and trigger time already exists.
    AlreadyArmed,
    /// Previous timer replaced because the trigger time moved.
    Rearmed,
    /// Job is terminal.
    Ignored,
}

struct Armed {
    generation: u64,
    trigger_time: DateTime<Utc>,
    handle: AbortHandle,
}

#[derive(Default)]
struct Timers {
    armed: HashMap<String, Armed>,
    next_generation: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    timers: Arc<Mutex<Timers>>,
    dispatcher: Dispatcher,
}

impl Scheduler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            timers: Arc::new(Mutex::new(Timers::default())),
            dispatcher,
        }
    }

    pub fn schedule(&self, job: Job) -> Scheduled {
        if job.status.is_terminal() {
            return Scheduled::Ignored;
        }

        let mut timers = self.timers.lock();
        let armed_for = timers.armed.get(&job.id).map(|a| a.trigger_time);
        let rearmed = match armed_for {
            Some(at) if at == job.trigger_time => return Scheduled::AlreadyArmed,
            Some(_) => {
                if let Some(old) = timers.armed.remove(&job.id) {
                    old.handle.abort();
                }
                true
            }
            None => false,
        };

        let Some(delay) = job.delay_from(Utc::now()) else {
            drop(timers);
            tracing::debug!(job_id = %job.id, "⚡ Due now, dispatching");
            self.dispatcher.enqueue(job);
            return Scheduled::Dispatched;
        };

        timers.next_generation += 1;
        let generation = timers.next_generation;
        let id = job.id.clone();
        let trigger_time = job.trigger_time;
        tracing::debug!(job_id = %id, "⏰ Armed for {} (in {:?})", trigger_time, delay);

        // Spawned while the lock is held so the entry exists before the timer can fire.
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = this.timers.lock();
                if timers.armed.get(&job.id).map(|a| a.generation) == Some(generation) {
                    timers.armed.remove(&job.id);
                } else {
                    return;
                }
            }
            tracing::debug!(job_id = %job.id, "🔔 Timer fired");
            this.dispatcher.enqueue(job);
        })
        .abort_handle();

        timers.armed.insert(
            id,
            Armed {
                generation,
                trigger_time,
                handle,
            },
        );
        if rearmed { Scheduled::Rearmed } else { Scheduled::Armed }
    }

    /// Disarm a pending timer. Jobs already handed to the dispatcher run on.
    pub fn cancel(&self, id: &str) -> bool {
        match self.timers.lock().armed.remove(id) {
            Some(armed) => {
                armed.handle.abort();
                tracing::debug!(job_id = %id, "🛑 Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// React to a change-feed event: pending jobs are (re)armed, anything
    /// else leaves the schedulable state and is disarmed.
    pub fn apply(&self, event: ChangeEvent) {
        if event.job.status == JobStatus::Pending {
            self.schedule(event.job);
        } else {
            self.cancel(&event.job.id);
        }
    }

    pub fn is_armed(&self, id: &str) -> bool {
        self.timers.lock().armed.contains_key(id)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.lock().armed.len()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Abort every armed timer, e.g. on shutdown.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        let count = timers.armed.len();
        for (_, armed) in timers.armed.drain() {
            armed.handle.abort();
        }
        if count > 0 {
            tracing::info!("🛑 Scheduler stopped, {} timer(s) disarmed", count);
        }
    }
}
