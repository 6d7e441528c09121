//! Ed25519 keypairs for ledger accounts.
//!
//! Key generation and signing are delegated to `ed25519-dalek`; this module
//! only binds a signing key to the [`AccountId`] it controls.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

use crate::{AccountId, TxHash};

/// An account's master keypair.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// The account this key controls.
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        AccountId(self.signing.verifying_key().to_bytes())
    }

    /// Sign a transaction identity hash.
    #[must_use]
    pub fn sign(&self, hash: &TxHash) -> [u8; 64] {
        self.signing.sign(hash.as_bytes()).to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("account", &self.account_id())
            .finish_non_exhaustive()
    }
}

/// Verify an ed25519 signature over a transaction hash.
///
/// Returns `false` for malformed keys or signatures.
#[must_use]
pub fn verify_signature(account: &AccountId, hash: &TxHash, signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(account.as_bytes()) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    key.verify(hash.as_bytes(), &Signature::from_bytes(&bytes))
        .is_ok()
}
