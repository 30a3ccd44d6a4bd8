//! [`RetryPolicy`] – bounded retry for fingerprint operations.
//!
//! Each attempt reports an [`AttemptOutcome`]. An explicit rejection and a
//! missing/unexpected answer both consume an attempt but back off for
//! different durations. Success returns at once; exhausting the ceiling
//! returns `false`. No backoff is slept after the final attempt.

use std::future::Future;
use std::time::Duration;

use smartbin_types::BinError;
use tracing::{info, warn};

/// What a single attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// The device answered with an explicit failure token.
    Rejected,
    /// No answer within the timeout, or an answer outside the vocabulary.
    NoResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after an explicit rejection.
    pub rejected_backoff: Duration,
    /// Pause after a missing or unexpected response.
    pub no_response_backoff: Duration,
}

impl RetryPolicy {
    /// Fingerprint enrolment: 3 attempts.
    pub const fn registration() -> Self {
        Self {
            max_attempts: 3,
            rejected_backoff: Duration::from_secs(2),
            no_response_backoff: Duration::from_secs(1),
        }
    }

    /// Fingerprint matching: 5 attempts.
    pub const fn verification() -> Self {
        Self {
            max_attempts: 5,
            rejected_backoff: Duration::from_secs(2),
            no_response_backoff: Duration::from_secs(1),
        }
    }

    /// Drive `attempt` until it succeeds or the ceiling is reached.
    ///
    /// `attempt` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Transport errors from an attempt abort the loop and are returned as-is.
    pub async fn run<F, Fut>(&self, operation: &str, mut attempt: F) -> Result<bool, BinError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<AttemptOutcome, BinError>>,
    {
        for n in 1..=self.max_attempts {
            let remaining = self.max_attempts - n;
            match attempt(n).await? {
                AttemptOutcome::Success => {
                    info!(operation, attempt = n, "operation succeeded");
                    return Ok(true);
                }
                AttemptOutcome::Rejected => {
                    warn!(operation, attempt = n, remaining, "device rejected attempt");
                    if remaining > 0 {
                        tokio::time::sleep(self.rejected_backoff).await;
                    }
                }
                AttemptOutcome::NoResponse => {
                    warn!(operation, attempt = n, remaining, "no usable response");
                    if remaining > 0 {
                        tokio::time::sleep(self.no_response_backoff).await;
                    }
                }
            }
        }
        warn!(operation, attempts = self.max_attempts, "giving up after maximum attempts");
        Ok(false)
    }
}
