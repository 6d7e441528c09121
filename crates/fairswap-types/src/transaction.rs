//! Transaction model: operations, time windows, envelopes, and the
//! pre-authorizable [`ConditionalTransaction`].
//!
//! A transaction's identity hash commits to its source account, sequence,
//! time window, and operations. Pre-authorizing that hash on an account
//! grants consent to exactly this transaction and nothing else.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{AccountId, ClaimKind, Commitment, Keypair, Signer, ThresholdClass, TxHash};

/// Convert an instant to whole Unix seconds (clamped at zero).
#[must_use]
pub fn unix_secs(instant: DateTime<Utc>) -> u64 {
    u64::try_from(instant.timestamp()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// TimeWindow
// ---------------------------------------------------------------------------

/// Half-open validity window `[min_time, max_time)` in Unix seconds.
/// `max_time == None` means no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub min_time: u64,
    pub max_time: Option<u64>,
}

impl TimeWindow {
    /// `[0, until)`.
    #[must_use]
    pub fn before(until: u64) -> Self {
        Self {
            min_time: 0,
            max_time: Some(until),
        }
    }

    /// `[from, until)`, or `[from, ∞)` when `until` is `None`.
    #[must_use]
    pub fn between(from: u64, until: Option<u64>) -> Self {
        Self {
            min_time: from,
            max_time: until,
        }
    }

    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            min_time: 0,
            max_time: None,
        }
    }

    #[must_use]
    pub fn contains(&self, now: u64) -> bool {
        now >= self.min_time && self.max_time.is_none_or(|max| now < max)
    }

    /// The window opens later than `now`.
    #[must_use]
    pub fn is_pending_at(&self, now: u64) -> bool {
        now < self.min_time
    }

    /// The window has closed for good at `now`.
    #[must_use]
    pub fn is_closed_at(&self, now: u64) -> bool {
        self.max_time.is_some_and(|max| now >= max)
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max_time {
            Some(max) => write!(f, "[{}, {max})", self.min_time),
            None => write!(f, "[{}, ∞)", self.min_time),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Changes to an account's signing configuration. Unset fields are left
/// untouched; a signer with weight 0 removes that signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOptions {
    pub master_weight: Option<u8>,
    pub low_threshold: Option<u8>,
    pub medium_threshold: Option<u8>,
    pub high_threshold: Option<u8>,
    pub signer: Option<Signer>,
}

/// A single ledger operation, always sourced from the transaction's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    CreateAccount {
        destination: AccountId,
        starting_balance: Decimal,
    },
    Payment {
        destination: AccountId,
        amount: Decimal,
    },
    SetOptions(SetOptions),
}

impl Operation {
    #[must_use]
    pub fn threshold_class(&self) -> ThresholdClass {
        match self {
            Self::CreateAccount { .. } | Self::Payment { .. } => ThresholdClass::Medium,
            Self::SetOptions(_) => ThresholdClass::High,
        }
    }

    fn hash_into(&self, hasher: &mut Sha256) {
        match self {
            Self::CreateAccount {
                destination,
                starting_balance,
            } => {
                hasher.update([0u8]);
                hasher.update(destination.as_bytes());
                hasher.update(starting_balance.normalize().to_string().as_bytes());
            }
            Self::Payment {
                destination,
                amount,
            } => {
                hasher.update([1u8]);
                hasher.update(destination.as_bytes());
                hasher.update(amount.normalize().to_string().as_bytes());
            }
            Self::SetOptions(opts) => {
                hasher.update([2u8]);
                for field in [
                    opts.master_weight,
                    opts.low_threshold,
                    opts.medium_threshold,
                    opts.high_threshold,
                ] {
                    match field {
                        Some(v) => hasher.update([1u8, v]),
                        None => hasher.update([0u8]),
                    }
                }
                match &opts.signer {
                    None => hasher.update([0u8]),
                    Some(Signer::MasterKey { weight }) => hasher.update([1u8, *weight]),
                    Some(Signer::PreAuthorizedTx { hash, weight }) => {
                        hasher.update([2u8, *weight]);
                        hasher.update(hash.as_bytes());
                    }
                    Some(Signer::HashPreimage { digest, weight }) => {
                        hasher.update([3u8, *weight]);
                        hasher.update(digest.as_bytes());
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A transaction body: everything its identity hash commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub source: AccountId,
    pub sequence: u64,
    pub operations: Vec<Operation>,
    pub time_window: TimeWindow,
}

impl Transaction {
    /// Deterministic identity hash.
    ///
    /// `SHA-256("fairswap:tx:v1:" || source || sequence || min || max || n_ops || ops...)`
    #[must_use]
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();
        hasher.update(b"fairswap:tx:v1:");
        hasher.update(self.source.as_bytes());
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.time_window.min_time.to_le_bytes());
        // 0 encodes "no upper bound", as on ledgers with u64 time bounds.
        hasher.update(self.time_window.max_time.unwrap_or(0).to_le_bytes());
        hasher.update((self.operations.len() as u64).to_le_bytes());
        for op in &self.operations {
            op.hash_into(&mut hasher);
        }
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        TxHash(hash)
    }

    /// The strongest threshold class any operation requires.
    #[must_use]
    pub fn threshold_class(&self) -> ThresholdClass {
        self.operations
            .iter()
            .map(Operation::threshold_class)
            .max()
            .unwrap_or(ThresholdClass::Low)
    }

    /// Wrap into an unsigned envelope.
    #[must_use]
    pub fn into_envelope(self) -> TransactionEnvelope {
        TransactionEnvelope {
            transaction: self,
            signatures: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A signature attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoratedSignature {
    /// Ed25519 signature over the transaction hash.
    Ed25519 { signer: AccountId, signature: Vec<u8> },
    /// A revealed preimage satisfying a hash-preimage signer.
    HashPreimage(Vec<u8>),
}

/// A transaction plus the signatures it is submitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub transaction: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

impl TransactionEnvelope {
    #[must_use]
    pub fn hash(&self) -> TxHash {
        self.transaction.hash()
    }

    /// Add an ed25519 signature from `keypair`.
    pub fn sign(&mut self, keypair: &Keypair) {
        let hash = self.hash();
        self.signatures.push(DecoratedSignature::Ed25519 {
            signer: keypair.account_id(),
            signature: keypair.sign(&hash).to_vec(),
        });
    }

    /// Attach a preimage for a hash-preimage signer.
    pub fn reveal(&mut self, preimage: Vec<u8>) {
        self.signatures.push(DecoratedSignature::HashPreimage(preimage));
    }

    /// Preimages carried by this envelope.
    pub fn preimages(&self) -> impl Iterator<Item = &[u8]> {
        self.signatures.iter().filter_map(|s| match s {
            DecoratedSignature::HashPreimage(p) => Some(p.as_slice()),
            DecoratedSignature::Ed25519 { .. } => None,
        })
    }
}

// ---------------------------------------------------------------------------
// ConditionalTransaction
// ---------------------------------------------------------------------------

/// One half of an escrow account's transaction pair, built before the
/// account is sealed and kept off-chain until a claimant submits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalTransaction {
    pub kind: ClaimKind,
    pub transaction: Transaction,
    /// The share commitment whose preimage must accompany submission.
    /// Not part of the identity hash.
    pub commitment: Commitment,
}

impl ConditionalTransaction {
    /// The hash pre-authorized on the escrow account.
    #[must_use]
    pub fn identity_hash(&self) -> TxHash {
        self.transaction.hash()
    }

    #[must_use]
    pub fn account(&self) -> AccountId {
        self.transaction.source
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.transaction.sequence
    }

    #[must_use]
    pub fn time_window(&self) -> TimeWindow {
        self.transaction.time_window
    }

    /// Payment recipients and amounts, in operation order.
    #[must_use]
    pub fn payees(&self) -> Vec<(AccountId, Decimal)> {
        self.transaction
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Payment {
                    destination,
                    amount,
                } => Some((*destination, *amount)),
                _ => None,
            })
            .collect()
    }

    /// Build the submission envelope, attaching `preimage` if given.
    #[must_use]
    pub fn envelope(&self, preimage: Option<&[u8]>) -> TransactionEnvelope {
        let mut envelope = self.transaction.clone().into_envelope();
        if let Some(p) = preimage {
            envelope.reveal(p.to_vec());
        }
        envelope
    }
}

/// Dummy transactions for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Transaction {
    /// A single payment of `amount` from `source` to `destination`.
    pub fn dummy_payment(
        source: AccountId,
        sequence: u64,
        destination: AccountId,
        amount: Decimal,
    ) -> Self {
        Self {
            source,
            sequence,
            operations: vec![Operation::Payment {
                destination,
                amount,
            }],
            time_window: TimeWindow::unbounded(),
        }
    }
}
