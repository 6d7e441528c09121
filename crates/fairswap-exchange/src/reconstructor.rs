//! Secret reconstruction from the ledger.
//!
//! Every executed claim carries its escrow's share as a hash-preimage
//! signature. Anyone holding the descriptor can read both back and rebuild
//! the secret, without either party's cooperation.

use std::sync::Arc;

use fairswap_escrow::{SealedEscrow, SharingScheme};
use fairswap_ledger::{LedgerClient, query};
use fairswap_types::{
    DecoratedSignature, Digest, FairswapError, Result, RetryPolicy, Secret, Share,
};

use crate::orchestrator::ExchangeDescriptor;

/// Reads revealed shares off the ledger.
pub struct SecretReconstructor {
    ledger: Arc<dyn LedgerClient>,
    retry: RetryPolicy,
}

impl SecretReconstructor {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, retry: RetryPolicy) -> Self {
        Self { ledger, retry }
    }

    /// The share revealed by `escrow`'s claim, if the claim has executed.
    ///
    /// Only the account's most recent transaction is considered, and only
    /// if it is one of the pre-authorized pair at the claim sequence.
    pub async fn revealed_share(&self, escrow: &SealedEscrow) -> Result<Option<Share>> {
        let records = query(&self.retry, "recent_transactions", || {
            self.ledger.recent_transactions(&escrow.account, 1)
        })
        .await?;
        let Some(last) = records.first() else {
            return Ok(None);
        };
        if last.sequence != escrow.claim_sequence() || escrow.kind_of(&last.hash).is_none() {
            return Ok(None);
        }

        let share = last.signatures.iter().find_map(|sig| match sig {
            DecoratedSignature::HashPreimage(preimage) if escrow.commitment.digest.matches(preimage) => {
                Share::from_preimage(preimage).ok()
            }
            _ => None,
        });
        Ok(share.filter(|s| escrow.commitment.opens(s)))
    }

    /// Rebuild the secret from both escrow accounts' revealed shares.
    ///
    /// # Errors
    /// `SharesMissing` if fewer than two shares have been revealed.
    pub async fn recover(&self, descriptor: &ExchangeDescriptor) -> Result<Secret> {
        let mut shares = Vec::with_capacity(descriptor.escrows.len());
        for escrow in &descriptor.escrows {
            if let Some(share) = self.revealed_share(escrow).await? {
                shares.push(share);
            }
        }

        let scheme = SharingScheme::two_of_two();
        let needed = usize::from(scheme.threshold());
        if shares.len() < needed {
            return Err(FairswapError::SharesMissing {
                needed,
                found: shares.len(),
            });
        }
        let secret = scheme.reconstruct(&shares)?;
        tracing::info!(exchange = %descriptor.id, bytes = secret.len(), "Secret reconstructed from ledger");
        Ok(secret)
    }

    /// [`recover`](Self::recover), then check the result against an
    /// out-of-band digest of the whole secret.
    ///
    /// # Errors
    /// `SecretMismatch` if the digest does not match.
    pub async fn recover_verified(
        &self,
        descriptor: &ExchangeDescriptor,
        expected: &Digest,
    ) -> Result<Secret> {
        let secret = self.recover(descriptor).await?;
        if secret.digest() != *expected {
            return Err(FairswapError::SecretMismatch);
        }
        Ok(secret)
    }
}
