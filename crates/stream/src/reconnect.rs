use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Reconnect attempts after a close before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Delay before each reconnect attempt.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconcile, wait `delay`, then connect again.
    Retry { attempt: u32, delay: Duration },
    /// Budget exhausted. The counter has been reset for the next cycle.
    GiveUp { attempts: u32 },
}

/// Attempt counter of one network's connection.
#[derive(Debug)]
pub struct ReconnectionController {
    max_attempts: u32,
    interval: Duration,
    attempts: AtomicU32,
}

impl Default for ReconnectionController {
    fn default() -> Self {
        Self::new(MAX_RECONNECT_ATTEMPTS, RECONNECT_INTERVAL)
    }
}

impl ReconnectionController {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn on_open(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    pub fn on_close(&self) -> ReconnectDecision {
        let result = self
            .attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_attempts).then_some(n + 1)
            });
        match result {
            Ok(prev) => ReconnectDecision::Retry {
                attempt: prev + 1,
                delay: self.interval,
            },
            Err(attempts) => {
                self.attempts.store(0, Ordering::SeqCst);
                ReconnectDecision::GiveUp { attempts }
            }
        }
    }
}
