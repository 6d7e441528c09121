//! The ledger collaborator contract.
//!
//! The ledger is assumed to enforce monotonic per-account sequence numbers,
//! half-open transaction time windows, and weighted signature thresholds
//! per operation class. Implementations report semantic rejections as
//! [`Rejection`]s and availability problems as transient errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fairswap_types::{
    AccountId, AccountSnapshot, DecoratedSignature, TimeWindow, TransactionEnvelope, TxHash,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that are worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why the ledger refused a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The account's next sequence is not the transaction's. For a sealed
    /// escrow account this means the sibling transaction already executed.
    #[error("bad sequence: expected {expected}, got {got}")]
    BadSequence { expected: u64, got: u64 },

    /// Submitted before `min_time` or at/after `max_time`.
    #[error("outside time window {window} at {now}")]
    OutsideTimeWindow { window: TimeWindow, now: u64 },

    /// Collected signer weight is below the operation's threshold.
    #[error("threshold not met: need {required}, got {weight}")]
    ThresholdNotMet { required: u32, weight: u32 },

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("insufficient balance on {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: AccountId,
        needed: Decimal,
        available: Decimal,
    },

    #[error("malformed transaction: {0}")]
    Malformed(String),

    /// Network or availability failure. Nothing was applied.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
}

impl Transient for Rejection {
    fn is_transient(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_))
    }
}

/// Errors from ledger queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("request refused: {0}")]
    Refused(String),
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// One accepted transaction in an account's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub hash: TxHash,
    pub source: AccountId,
    pub sequence: u64,
    /// Signatures exactly as submitted, revealed preimages included.
    pub signatures: Vec<DecoratedSignature>,
    pub applied_at: DateTime<Utc>,
}

/// The account-based ledger the protocol runs on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a signed envelope. On success the source account's sequence
    /// advances to the transaction's sequence.
    async fn submit(&self, envelope: &TransactionEnvelope) -> Result<TxHash, Rejection>;

    /// Current sequence number of `account`.
    async fn sequence(&self, account: &AccountId) -> Result<u64, LedgerError>;

    /// Signer set, thresholds, balance, and sequence of `account`.
    async fn account(&self, account: &AccountId) -> Result<AccountSnapshot, LedgerError>;

    /// Up to `limit` accepted transactions sourced from `account`,
    /// newest first.
    async fn recent_transactions(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<LedgerRecord>, LedgerError>;

    /// Signatures of the last `limit` transactions, newest first.
    async fn recent_signatures(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<DecoratedSignature>, LedgerError> {
        Ok(self
            .recent_transactions(account, limit)
            .await?
            .into_iter()
            .flat_map(|record| record.signatures)
            .collect())
    }

    /// The ledger's notion of the current time. Time windows are judged
    /// against this, not against the local clock.
    async fn now(&self) -> Result<DateTime<Utc>, LedgerError>;
}

/// Bootstraps accounts with funds (a testnet faucet or a treasury).
#[async_trait]
pub trait Funder: Send + Sync {
    async fn fund(&self, account: &AccountId) -> Result<(), LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailability_is_transient() {
        assert!(Rejection::LedgerUnavailable("down".into()).is_transient());
        assert!(!Rejection::BadSequence { expected: 2, got: 2 }.is_transient());
        assert!(!Rejection::Malformed("x".into()).is_transient());
        assert!(LedgerError::Unavailable("down".into()).is_transient());
        assert!(!LedgerError::AccountNotFound(AccountId([0; 32])).is_transient());
    }

    #[test]
    fn rejection_display() {
        let r = Rejection::OutsideTimeWindow {
            window: TimeWindow::before(100),
            now: 150,
        };
        assert_eq!(r.to_string(), "outside time window [0, 100) at 150");
    }
}
