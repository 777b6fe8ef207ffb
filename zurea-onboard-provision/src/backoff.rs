//! Bounded fixed-delay retry primitive.
//!
//! IAM policy changes propagate with noticeable lag; the verification step
//! polls with a fixed delay and a bounded attempt count. The primitive is
//! driven by `tokio::time` so tests run it under a paused clock.

use std::future::Future;
use std::time::Duration;

use log::debug;

/// A bounded, fixed-delay retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    attempts: u32,
    delay: Duration,
}

impl FixedBackoff {
    /// Create a schedule of `attempts` tries spaced `delay` apart. At least
    /// one attempt is always made.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Number of attempts this schedule makes.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted,
    /// sleeping the fixed delay between attempts. Returns the last error on
    /// exhaustion. The operation receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> std::result::Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.attempts => return Err(err),
                Err(err) => {
                    debug!(
                        "attempt {attempt}/{} failed, retrying in {:?}: {err}",
                        self.attempts, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
