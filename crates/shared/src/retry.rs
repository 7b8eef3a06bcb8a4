use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that can tell whether another attempt might succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to try a network operation and how long to wait between
/// attempts.
///
/// `backoff[i]` is the pause after the `i + 1`-th failed attempt; when the
/// schedule is shorter than the attempts, its last entry repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Same pause after every failure
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, vec![delay])
    }

    /// Pause grows by `step` after each failure (step, 2*step, ...)
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        let backoff = (1..max_attempts.max(1)).map(|i| step * i).collect();
        Self::new(max_attempts, backoff)
    }

    /// Single attempt
    pub fn none() -> Self {
        Self::new(1, Vec::new())
    }

    /// Policy used for feed polling: 3 attempts, 2 s apart
    pub fn for_feeds() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }

    /// Policy used for discovery probes: 2 attempts, 1 s backoff
    pub fn for_probes() -> Self {
        Self::linear(2, Duration::from_secs(1))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause after failed attempt number `attempt` (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_feeds()
    }
}
