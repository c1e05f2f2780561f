// ============================================================================
// Bounded Retry
// Explicit attempt loop with exponential backoff
// ============================================================================

use crate::domain::RetryPolicy;
use crate::error::DispatchError;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How a retried operation ended
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    /// Last error after the final attempt, or the first non-retryable one
    Exhausted { error: DispatchError, attempts: u32 },
    /// Cancelled while backing off between attempts
    Cancelled { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// The operation receives the 1-based attempt number. Between attempts the
/// loop sleeps `policy.delay_after(attempt)`; errors that are not retryable
/// end the loop at once. An attempt in progress is never interrupted, only
/// the backoff sleep observes `cancel`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DispatchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                }
            },
            Err(error) => error,
        };

        if attempt >= max_attempts || !error.is_retryable() {
            return RetryOutcome::Exhausted {
                error,
                attempts: attempt,
            };
        }

        let delay = policy.delay_after(attempt);
        warn!(attempt, max_attempts, delay = ?delay, error = %error, "Attempt failed, retrying");

        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts: attempt },
            _ = tokio::time::sleep(delay) => {},
        }
        attempt += 1;
    }
}
