//! Boot-time reconciliation: re-arm every job a previous process left
//! `PENDING` or `PROCESSING`.
//!
//! `PROCESSING` rows are assumed abandoned by a crashed worker and run
//! again (at-least-once); the outbound-message id check is what keeps a
//! re-run from recording a second message.

use reachly_core::error::Result;
use reachly_core::traits::JobStore;
use reachly_core::types::{JobKind, JobStatus};
use serde::Serialize;

use crate::retry::RetryExecutor;
use crate::schedule::{Scheduled, Scheduler};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub dispatched: usize,
    pub armed: usize,
    /// Rows left in `PROCESSING` by a previous process.
    pub recovered: usize,
    pub pages: usize,
}

/// Page through non-terminal jobs of every kind and schedule each one.
pub async fn reconcile(
    store: &dyn JobStore,
    scheduler: &Scheduler,
    retry: &RetryExecutor,
    batch_size: usize,
) -> Result<ReconcileReport> {
    let batch_size = batch_size.max(1);
    let mut report = ReconcileReport::default();
    let mut after: Option<String> = None;

    loop {
        let page = retry
            .run("fetch reconcilable jobs", || {
                store.fetch_jobs(&JobKind::ALL, &JobStatus::RECONCILABLE, after.as_deref(), batch_size)
            })
            .await?;
        if page.is_empty() {
            break;
        }
        report.pages += 1;
        let full = page.len() == batch_size;
        after = page.last().map(|job| job.id.clone());

        for job in page {
            report.scanned += 1;
            if job.status == JobStatus::Processing {
                tracing::warn!(job_id = %job.id, "♻️ Recovering job left PROCESSING");
                report.recovered += 1;
            }
            match scheduler.schedule(job) {
                Scheduled::Dispatched => report.dispatched += 1,
                Scheduled::Armed | Scheduled::Rearmed => report.armed += 1,
                Scheduled::AlreadyArmed | Scheduled::Ignored => {}
            }
        }

        if !full {
            break;
        }
    }

    tracing::info!(
        "🔄 Reconciled {} job(s): {} dispatched, {} armed, {} recovered from PROCESSING",
        report.scanned,
        report.dispatched,
        report.armed,
        report.recovered
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::registry::tests::context;
    use crate::registry::HandlerRegistry;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use reachly_core::types::{actions, Job};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_pages_through_backlog() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(HandlerRegistry::new(context(store.clone())));
        let scheduler = Scheduler::new(Dispatcher::new(registry, 1));

        let later = Utc::now() + chrono::Duration::hours(1);
        let mut jobs = Vec::new();
        for i in 0..7 {
            let kind = JobKind::ALL[i % 3];
            jobs.push(Job::new(kind, actions::SEND_MESSAGE, serde_json::json!({})).with_id(format!("j{i}")).at(later));
        }
        jobs.push(Job::new(JobKind::WorkflowLog, "noop", serde_json::json!({})).with_id("due"));
        store.insert_jobs(&jobs).await.unwrap();
        store.update_job_status("j1", JobStatus::Processing, None).await.unwrap();
        store.update_job_status("j2", JobStatus::Completed, None).await.unwrap();
        store.update_job_status("j3", JobStatus::Failed, Some("x")).await.unwrap();

        let report = reconcile(store.as_ref(), &scheduler, &RetryExecutor::no_retry(), 2)
            .await
            .unwrap();

        assert_eq!(report.scanned, 6);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.armed, 5);
        assert_eq!(report.recovered, 1);
        assert_eq!(report.pages, 3);
        assert!(scheduler.is_armed("j1"));
        assert!(!scheduler.is_armed("j2"));
        assert_eq!(scheduler.armed_count(), 5);

        // A second pass finds everything already armed.
        let again = reconcile(store.as_ref(), &scheduler, &RetryExecutor::no_retry(), 100)
            .await
            .unwrap();
        assert_eq!(again.armed, 0);
        assert_eq!(scheduler.armed_count(), 5);
    }
}
