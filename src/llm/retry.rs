//! Transport retry with exponential backoff
//!
//! Only model transport calls are retried. Tool failures are never retried
//! here; they surface as observations so the model can self-correct.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::TransportError;

/// Retry policy for one logical transport call, derived from `RunConfig`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero means the call is never made.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }
}

/// Attempt counter and next backoff delay for a single in-flight call.
/// Owned exclusively by the call site; reset per logical call.
#[derive(Debug)]
pub struct RetryState {
    attempts: u32,
    next_delay: Duration,
}

impl RetryState {
    pub fn new(backoff_base: Duration) -> Self {
        Self {
            attempts: 0,
            next_delay: backoff_base,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Delay to sleep before the next attempt. Doubles on each call.
    pub fn take_delay(&mut self) -> Duration {
        let delay = self.next_delay;
        self.next_delay = self.next_delay.saturating_mul(2);
        delay
    }
}

/// Run a transport call under the retry policy. `what` names the call for
/// logging only. Returns the last error once the attempt budget is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut call: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    if policy.max_attempts == 0 {
        return Err(TransportError::Request(format!(
            "{what}: retry budget is zero"
        )));
    }

    let mut state = RetryState::new(policy.backoff_base);
    loop {
        state.record_attempt();
        match call().await {
            Ok(value) => {
                debug!(call = what, attempt = state.attempts(), "transport call succeeded");
                return Ok(value);
            }
            Err(err) => {
                if state.attempts() >= policy.max_attempts {
                    warn!(
                        call = what,
                        attempts = state.attempts(),
                        error = %err,
                        "transport retry budget exhausted"
                    );
                    return Err(err);
                }
                let delay = state.take_delay();
                warn!(
                    call = what,
                    attempt = state.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transport call failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
