//! Bounded retries with exponential backoff.
//!
//! Only transient failures are retried. Semantic outcomes (stale sequence,
//! missed window, missing preimage) are final and returned at once.

use std::fmt::Display;
use std::future::Future;

use fairswap_types::{FairswapError, RetryPolicy};

use crate::client::{LedgerError, Transient};

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// A non-transient failure. Not retried.
    Permanent(E),
    /// Every attempt failed transiently.
    Exhausted { attempts: u32, last: E },
}

impl<E: Display> RetryError<E> {
    /// Escalate exhaustion into the engine's transient-ledger error, handing
    /// permanent failures to `permanent`.
    pub fn escalate(self, operation: &str, permanent: impl FnOnce(E) -> FairswapError) -> FairswapError {
        match self {
            Self::Permanent(e) => permanent(e),
            Self::Exhausted { attempts, last } => FairswapError::TransientLedger {
                operation: operation.to_string(),
                attempts,
                reason: last.to_string(),
            },
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(
                    operation,
                    attempts = attempt,
                    error = %e,
                    "Ledger call failed on every attempt"
                );
                return Err(RetryError::Exhausted { attempts: attempt, last: e });
            }
            Err(e) => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Transient ledger failure, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Retry a ledger query and map the outcome into [`FairswapError`].
pub async fn query<T, F, Fut>(policy: &RetryPolicy, operation: &str, call: F) -> fairswap_types::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    with_retry(policy, operation, call).await.map_err(|e| {
        e.escalate(operation, |err| FairswapError::LedgerRejected {
            reason: format!("{operation}: {err}"),
        })
    })
}
