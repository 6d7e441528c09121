//! Account signer model: weighted signers and per-class thresholds.
//!
//! ```text
//!   sealed escrow account
//!   ├── MasterKey            weight 0
//!   ├── PreAuthorizedTx(h1)  weight 1   ─┐
//!   ├── PreAuthorizedTx(h2)  weight 1    ├─ medium = 2
//!   └── HashPreimage(d)      weight 1   ─┘
//! ```

use serde::{Deserialize, Serialize};

use crate::{AccountId, Digest, TxHash, constants};

/// A weighted signer on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signer {
    /// The account's own ed25519 key.
    MasterKey { weight: u8 },
    /// Satisfied automatically when the transaction with this hash is
    /// submitted. No cryptographic signature required.
    PreAuthorizedTx { hash: TxHash, weight: u8 },
    /// Satisfied when the submission carries a preimage of `digest`.
    HashPreimage { digest: Digest, weight: u8 },
}

impl Signer {
    #[must_use]
    pub fn weight(&self) -> u8 {
        match self {
            Self::MasterKey { weight }
            | Self::PreAuthorizedTx { weight, .. }
            | Self::HashPreimage { weight, .. } => *weight,
        }
    }

    /// Two signers occupy the same slot if they have the same key,
    /// regardless of weight.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::MasterKey { .. }, Self::MasterKey { .. }) => true,
            (Self::PreAuthorizedTx { hash: a, .. }, Self::PreAuthorizedTx { hash: b, .. }) => a == b,
            (Self::HashPreimage { digest: a, .. }, Self::HashPreimage { digest: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Operation class an operation's required weight is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThresholdClass {
    Low,
    Medium,
    High,
}

/// Required signature weight per operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Thresholds {
    /// Thresholds installed when an escrow account is sealed.
    #[must_use]
    pub const fn sealed() -> Self {
        Self {
            low: constants::SEALED_LOW_THRESHOLD,
            medium: constants::SEALED_MEDIUM_THRESHOLD,
            high: constants::SEALED_HIGH_THRESHOLD,
        }
    }

    #[must_use]
    pub fn for_class(&self, class: ThresholdClass) -> u8 {
        match class {
            ThresholdClass::Low => self.low,
            ThresholdClass::Medium => self.medium,
            ThresholdClass::High => self.high,
        }
    }
}

/// Read-only view of an account as the ledger reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub sequence: u64,
    pub balance: rust_decimal::Decimal,
    pub master_weight: u8,
    pub thresholds: Thresholds,
    /// Additional signers (the master key is reported via `master_weight`).
    pub signers: Vec<Signer>,
}

impl AccountSnapshot {
    /// All signers including the master key.
    #[must_use]
    pub fn all_signers(&self) -> Vec<Signer> {
        let mut all = Vec::with_capacity(self.signers.len() + 1);
        all.push(Signer::MasterKey {
            weight: self.master_weight,
        });
        all.extend_from_slice(&self.signers);
        all
    }

    /// Whether the account is sealed: master key revoked and the only
    /// signers are pre-authorized transactions and one hash preimage whose
    /// weights together equal the medium threshold.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        let preimage: Vec<_> = self
            .signers
            .iter()
            .filter(|s| matches!(s, Signer::HashPreimage { .. }))
            .collect();
        let only_expected = self
            .signers
            .iter()
            .all(|s| matches!(s, Signer::PreAuthorizedTx { .. } | Signer::HashPreimage { .. }));
        let medium = u16::from(self.thresholds.medium);
        let balanced = preimage.first().is_some_and(|p| {
            self.signers.iter().all(|s| match s {
                Signer::PreAuthorizedTx { weight, .. } => {
                    u16::from(*weight) + u16::from(p.weight()) == medium
                }
                _ => true,
            })
        });
        self.master_weight == 0 && only_expected && preimage.len() == 1 && balanced
    }
}
