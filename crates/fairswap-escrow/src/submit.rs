//! Submitting conditional transactions and classifying the outcome.
//!
//! | Ledger rejection      | Taxonomy entry                        |
//! |-----------------------|---------------------------------------|
//! | `BadSequence`         | `RaceLoss` (sibling already executed) |
//! | `OutsideTimeWindow`   | `WindowMiss { closed }`               |
//! | `ThresholdNotMet`     | `ThresholdFailure`                    |
//! | `LedgerUnavailable`   | `TransientLedger`                     |
//! | anything else         | `LedgerRejected`                      |

use fairswap_ledger::{LedgerClient, Rejection, RetryError, with_retry};
use fairswap_types::{AccountId, ConditionalTransaction, FairswapError, RetryPolicy, TxHash};

async fn attempt(
    ledger: &dyn LedgerClient,
    tx: &ConditionalTransaction,
    preimage: Option<&[u8]>,
    retry: &RetryPolicy,
) -> Result<TxHash, RetryError<Rejection>> {
    let envelope = tx.envelope(preimage);
    with_retry(retry, "submit", || ledger.submit(&envelope)).await
}

/// Submit `tx`, attaching `preimage` as a hash-preimage signature.
///
/// Transient unavailability is retried per `retry`; if it never clears the
/// last `LedgerUnavailable` is returned. Semantic rejections come back
/// on the first attempt.
pub async fn submit(
    ledger: &dyn LedgerClient,
    tx: &ConditionalTransaction,
    preimage: Option<&[u8]>,
    retry: &RetryPolicy,
) -> Result<TxHash, Rejection> {
    attempt(ledger, tx, preimage, retry).await.map_err(|e| match e {
        RetryError::Permanent(r) | RetryError::Exhausted { last: r, .. } => r,
    })
}

/// [`submit`], with the outcome mapped onto [`FairswapError`].
pub async fn submit_classified(
    ledger: &dyn LedgerClient,
    tx: &ConditionalTransaction,
    preimage: Option<&[u8]>,
    retry: &RetryPolicy,
) -> fairswap_types::Result<TxHash> {
    let account = tx.account();
    match attempt(ledger, tx, preimage, retry).await {
        Ok(hash) => {
            tracing::info!(account = %account, kind = %tx.kind, tx = %hash, "Claim accepted");
            Ok(hash)
        }
        Err(e) => Err(e.escalate("submit", |r| classify(&r, account))),
    }
}

/// Map a rejection of a transaction on `account` to exactly one error.
#[must_use]
pub fn classify(rejection: &Rejection, account: AccountId) -> FairswapError {
    match rejection {
        Rejection::BadSequence { .. } => FairswapError::RaceLoss { account },
        Rejection::OutsideTimeWindow { window, now } => FairswapError::WindowMiss {
            account,
            closed: window.is_closed_at(*now),
        },
        Rejection::ThresholdNotMet { required, weight } => FairswapError::ThresholdFailure {
            account,
            reason: format!("collected weight {weight} of {required}: preimage missing or wrong"),
        },
        Rejection::LedgerUnavailable(reason) => FairswapError::TransientLedger {
            operation: "submit".to_string(),
            attempts: 1,
            reason: reason.clone(),
        },
        Rejection::AccountNotFound(_)
        | Rejection::InsufficientBalance { .. }
        | Rejection::Malformed(_) => FairswapError::LedgerRejected {
            reason: rejection.to_string(),
        },
    }
}
