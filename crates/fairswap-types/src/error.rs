//! Error types for the fairswap protocol engine.
//!
//! All errors use the `FS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Configuration errors
//! - 2xx: Secret sharing errors
//! - 3xx: Escrow setup errors
//! - 4xx: Claim outcomes (race loss, window miss, threshold failure)
//! - 5xx: Ledger errors
//! - 6xx: Exchange state errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{AccountId, ExchangeState, SetupStep};

/// Central error enum for all fairswap operations.
#[derive(Debug, Error)]
pub enum FairswapError {
    // =================================================================
    // Configuration Errors (1xx)
    // =================================================================
    /// Bad protocol parameters. Raised before any ledger write.
    #[error("FS_ERR_100: Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // =================================================================
    // Secret Sharing Errors (2xx)
    // =================================================================
    /// Share count / threshold combination is not a valid scheme.
    #[error("FS_ERR_200: Invalid threshold: {threshold}-of-{shares}")]
    InvalidThreshold { shares: u8, threshold: u8 },

    /// Not enough distinct shares to reconstruct.
    #[error("FS_ERR_201: Insufficient shares: need {needed}, have {have}")]
    InsufficientShares { needed: usize, have: usize },

    /// Two shares carry the same index.
    #[error("FS_ERR_202: Ambiguous shares: index {index} given more than once")]
    AmbiguousShares { index: u8 },

    /// A share is malformed (bad index, wrong length, bad encoding).
    #[error("FS_ERR_203: Invalid share: {reason}")]
    InvalidShare { reason: String },

    /// Fewer revealed shares on the ledger than needed to reconstruct.
    #[error("FS_ERR_204: Shares missing on ledger: need {needed}, found {found}")]
    SharesMissing { needed: usize, found: usize },

    /// The reconstructed secret does not match the published commitment.
    #[error("FS_ERR_205: Reconstructed secret does not match its commitment")]
    SecretMismatch,

    // =================================================================
    // Escrow Setup Errors (3xx)
    // =================================================================
    /// Funding or sealing an escrow account failed. The exchange aborts.
    /// Until `last_step` reaches `SEALED` the account's master key is live
    /// and can be used to recover the funds.
    #[error("FS_ERR_300: Setup failed for {account} after step {last_step}: {reason}")]
    SetupFailure {
        account: AccountId,
        last_step: SetupStep,
        reason: String,
    },

    // =================================================================
    // Claim Outcomes (4xx)
    // =================================================================
    /// The sibling transaction consumed the sequence first. Expected.
    #[error("FS_ERR_400: Race lost on {account}: sibling transaction already executed")]
    RaceLoss { account: AccountId },

    /// Submitted outside the transaction's time window.
    #[error("FS_ERR_401: Time window missed on {account} (closed: {closed})")]
    WindowMiss { account: AccountId, closed: bool },

    /// Missing or wrong preimage, or no signer weight at all.
    #[error("FS_ERR_402: Signature threshold not met on {account}: {reason}")]
    ThresholdFailure { account: AccountId, reason: String },

    // =================================================================
    // Ledger Errors (5xx)
    // =================================================================
    /// The ledger stayed unavailable through every retry.
    #[error("FS_ERR_500: Ledger unavailable during {operation} after {attempts} attempts: {reason}")]
    TransientLedger {
        operation: String,
        attempts: u32,
        reason: String,
    },

    /// The ledger rejected a submission for a reason outside the claim
    /// taxonomy (unknown account, insufficient balance, malformed).
    #[error("FS_ERR_501: Ledger rejected submission: {reason}")]
    LedgerRejected { reason: String },

    /// The exchange cannot make progress.
    #[error("FS_ERR_502: Exchange stalled: {reason}")]
    ExchangeStalled { reason: String },

    // =================================================================
    // Exchange State Errors (6xx)
    // =================================================================
    /// An operation was attempted in the wrong state.
    #[error("FS_ERR_600: Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: ExchangeState,
        to: ExchangeState,
    },

    /// An operation needs a different exchange state.
    #[error("FS_ERR_601: Wrong state: expected {expected}, got {actual}")]
    WrongState {
        expected: ExchangeState,
        actual: ExchangeState,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("FS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("FS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// I/O error (config file).
    #[error("FS_ERR_903: I/O error: {0}")]
    Io(String),
}

impl FairswapError {
    /// Whether this error ends the caller's participation.
    ///
    /// Losing a race is an expected outcome, and a window that has not yet
    /// closed can be retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::RaceLoss { .. } | Self::WindowMiss { closed: false, .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, FairswapError>;

impl From<std::io::Error> for FairswapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FairswapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = FairswapError::RaceLoss {
            account: AccountId([1u8; 32]),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("FS_ERR_400"), "Got: {msg}");
    }

    #[test]
    fn setup_failure_names_account_and_step() {
        let err = FairswapError::SetupFailure {
            account: AccountId([0xcd; 32]),
            last_step: SetupStep::Funded,
            reason: "sealing rejected".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("FS_ERR_300"));
        assert!(msg.contains("cdcdcdcd"));
        assert!(msg.contains("FUNDED"));
    }

    #[test]
    fn fatality_classification() {
        let account = AccountId([0u8; 32]);
        assert!(!FairswapError::RaceLoss { account }.is_fatal());
        assert!(
            !FairswapError::WindowMiss {
                account,
                closed: false
            }
            .is_fatal()
        );
        assert!(
            FairswapError::WindowMiss {
                account,
                closed: true
            }
            .is_fatal()
        );
        assert!(
            FairswapError::ThresholdFailure {
                account,
                reason: "wrong preimage".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn all_errors_have_fs_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(FairswapError::SecretMismatch),
            Box::new(FairswapError::InsufficientShares { needed: 2, have: 1 }),
            Box::new(FairswapError::Internal("test".into())),
            Box::new(FairswapError::InvalidTransition {
                from: ExchangeState::Settled,
                to: ExchangeState::Setup,
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(msg.starts_with("FS_ERR_"), "Error missing FS_ERR_ prefix: {msg}");
        }
    }
}
