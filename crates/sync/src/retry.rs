use std::future::Future;
use std::time::Duration;

use node_rpc::NodeRpcError;
use tracing::debug;

/// Attempts per request before an error is surfaced.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Exponential backoff: `base * 2^(n-1)` before retry `n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_FETCH_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
            max_delay: RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the attempt budget runs out. `before_retry` runs ahead of each
    /// backoff sleep.
    pub async fn run<T, F, Fut, R, B>(
        &self,
        mut op: F,
        retryable: R,
        mut before_retry: B,
    ) -> Result<T, NodeRpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NodeRpcError>>,
        R: Fn(&NodeRpcError) -> bool,
        B: FnMut(&NodeRpcError),
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    before_retry(&e);
                    let delay = self.delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, err = %e, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(4), Duration::from_millis(500));
        assert_eq!(p.delay_for(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_run_stops_at_budget() {
        let calls = AtomicU32::new(0);
        let rotations = AtomicU32::new(0);
        let res: Result<(), _> = RetryPolicy::immediate(3)
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(NodeRpcError::NullResult)
                },
                NodeRpcError::is_transient,
                |_| {
                    rotations.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(rotations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_does_not_retry_pruned() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = RetryPolicy::immediate(3)
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(NodeRpcError::HeightPruned {
                        height: 1,
                        lowest_available: Some(10),
                    })
                },
                NodeRpcError::is_transient,
                |_| {},
            )
            .await;
        assert!(res.unwrap_err().is_pruned());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_recovers() {
        let calls = AtomicU32::new(0);
        let res = RetryPolicy::immediate(3)
            .run(
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(NodeRpcError::NullResult)
                    } else {
                        Ok(7u64)
                    }
                },
                NodeRpcError::is_transient,
                |_| {},
            )
            .await;
        assert_eq!(res.unwrap(), 7);
    }
}
