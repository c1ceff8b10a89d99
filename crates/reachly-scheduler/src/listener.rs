//! Change feed: row-level job events pushed from the store to the scheduler.

use reachly_core::types::ChangeEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::schedule::Scheduler;

pub type ChangeSender = mpsc::UnboundedSender<ChangeEvent>;
pub type ChangeReceiver = mpsc::UnboundedReceiver<ChangeEvent>;

/// Create a change-feed channel.
pub fn change_feed() -> (ChangeSender, ChangeReceiver) {
    mpsc::unbounded_channel()
}

/// Best-effort publish. A closed feed only means nobody is listening.
pub fn publish(feed: &ChangeSender, event: ChangeEvent) {
    if feed.send(event).is_err() {
        tracing::debug!("Change feed closed, event dropped");
    }
}

/// Drive the scheduler from the feed until every sender is dropped.
pub fn spawn_change_listener(mut rx: ChangeReceiver, scheduler: Scheduler) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("👂 Change listener started");
        let mut handled = 0u64;
        while let Some(event) = rx.recv().await {
            tracing::debug!(
                job_id = %event.job.id,
                "📨 {:?} on {:?} (status {})",
                event.op,
                event.table,
                event.job.status
            );
            scheduler.apply(event);
            handled += 1;
        }
        tracing::info!("👂 Change listener stopped after {} event(s)", handled);
    })
}
