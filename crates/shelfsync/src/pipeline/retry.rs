use std::fmt::Display;
use std::time::Duration;

use tracing::{error, warn};

/// Bounded retry with linear backoff for job-state writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

impl RetryPolicy {
    /// `attempts` is clamped to at least one.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `op` until it succeeds or the attempts are used up, sleeping
    /// `backoff * attempt` between tries on the tokio timer.
    pub async fn run_async<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    self.log_retry(what, attempt, &e);
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.log_exhausted(what, &e);
                    return Err(e);
                }
            }
        }
    }

    /// Blocking variant of [`RetryPolicy::run_async`] for synchronous
    /// callers such as converter progress callbacks. Never call it from
    /// async code: the sleep parks the worker thread.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    self.log_retry(what, attempt, &e);
                    std::thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(e) => {
                    self.log_exhausted(what, &e);
                    return Err(e);
                }
            }
        }
    }

    fn log_retry(&self, what: &str, attempt: u32, e: &dyn Display) {
        warn!(
            "{} failed (attempt {}/{}): {}",
            what, attempt, self.attempts, e
        );
    }

    fn log_exhausted(&self, what: &str, e: &dyn Display) {
        error!("{} failed after {} attempts: {}", what, self.attempts, e);
    }
}
