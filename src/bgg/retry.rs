//! Bounded retry for requests BGG answers with "accepted, still processing"

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// What a single request attempt produced
#[derive(Debug)]
pub enum Attempt<T> {
    /// The response is ready
    Ready(T),
    /// BGG queued the request (HTTP 202); ask again later
    Processing,
}

/// Fixed-delay retry policy with a hard attempt bound
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it is ready, fails hard, or the attempts run out.
    ///
    /// Processing answers and transient network errors are retried after
    /// `delay`. Exhausting the budget on processing answers yields
    /// `TransientUnavailable`; on network errors the last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt >= self.max_attempts;

            match op(attempt).await {
                Ok(Attempt::Ready(value)) => return Ok(value),
                Ok(Attempt::Processing) => {
                    if last {
                        log::error!(
                            "{} still processing after {} attempts, giving up",
                            label,
                            attempt
                        );
                        return Err(SyncError::TransientUnavailable { attempts: attempt });
                    }
                    log::warn!(
                        "{} returned 202 (attempt {}/{}); retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        self.delay
                    );
                }
                Err(e) if e.is_transient() && !last => {
                    log::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        self.delay
                    );
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.delay).await;
        }
    }
}
