use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::Result;

/// Bounded exponential backoff for broker and store I/O
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub tries: u32,
    pub delay_ms: u64,
    pub backoff: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 5,
            delay_ms: 2_000,
            backoff: 2,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(tries: u32) -> Self {
        Self {
            tries,
            delay_ms: 0,
            backoff: 1,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = (self.backoff.max(1) as u64).saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.delay_ms.saturating_mul(factor))
    }
}

/// Run `f` until it succeeds, fails with a non-transient error, or the policy runs out of tries.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let tries = policy.tries.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < tries => {
                let wait = policy.delay_for(attempt);
                tracing::warn!(
                    "{} failed: {}, retrying in {:?} (attempt {}/{})",
                    operation,
                    e,
                    wait,
                    attempt,
                    tries
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!("{} failed after {} attempts: {}", operation, tries, e);
                }
                return Err(e);
            }
        }
    }
}
