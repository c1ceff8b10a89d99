//! Bounded retry with a growing backoff for side-effecting async calls.
//!
//! Delay before retry `n` (1-indexed) is `base_delay × n`, so with
//! `max_retries = 3` and `base_delay = 1s` the waits are 1s, 2s, 3s.
//! Every error is retried the same way; callers that know a failure is
//! permanent must return it before entering [`RetryExecutor::run`].

use std::future::Future;
use std::time::Duration;

use reachly_core::config::EngineConfig;
use reachly_core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExecutor {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryExecutor {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait before the given retry (1 = first retry).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Run `op`, retrying failures until it succeeds or retries run out.
    /// On exhaustion the last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::debug!("✅ {} succeeded after {} retr(ies)", op_name, retry);
                    }
                    return Ok(value);
                }
                Err(e) if retry < self.max_retries => {
                    retry += 1;
                    let delay = self.backoff_for(retry);
                    tracing::warn!(
                        "⚠️ {} failed: {} (retrying in {:?}, {} retr(ies) left)",
                        op_name,
                        e,
                        delay,
                        self.max_retries - retry + 1
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        "❌ {} failed after {} attempt(s): {}",
                        op_name,
                        retry + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reachly_core::error::ReachlyError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_retry_curve_on_persistent_failure() {
        let retry = RetryExecutor::new(3, Duration::from_millis(1000));
        let attempts = Arc::new(parking_lot::Mutex::new(Vec::<Instant>::new()));

        let log = attempts.clone();
        let result: Result<()> = retry
            .run("always-fails", || {
                let log = log.clone();
                async move {
                    log.lock().push(Instant::now());
                    Err(ReachlyError::Channel("503".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(ReachlyError::Channel(ref m)) if m == "503"));
        let attempts = attempts.lock();
        assert_eq!(attempts.len(), 4);
        let waits: Vec<u128> = attempts
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect();
        assert_eq!(waits, vec![1000, 2000, 3000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let retry = RetryExecutor::new(3, Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let value = retry
            .run("flaky", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ReachlyError::Database("busy".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = RetryExecutor::no_retry()
            .run("once", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ReachlyError::Other("nope".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_linear() {
        let retry = RetryExecutor::new(5, Duration::from_millis(250));
        assert_eq!(retry.backoff_for(1), Duration::from_millis(250));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(500));
        assert_eq!(retry.backoff_for(4), Duration::from_millis(1000));
    }
}
