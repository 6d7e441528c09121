//! Claimant parties.
//!
//! A claimant holds its own share and the public descriptor, nothing else.
//! It has two ways to get paid:
//!
//! - **counter**: with the *other* party's leaked share, before τ, take the
//!   counterprize from the other party's escrow account
//! - **main**: after τ, reveal its *own* share to take the prize from its
//!   own escrow account
//!
//! Losing a race (`BadSequence`) is an expected outcome and is reported as
//! [`ClaimOutcome::SiblingWon`], not as an error.

use std::sync::Arc;

use fairswap_escrow::{SealedEscrow, submit_classified};
use fairswap_ledger::{Clock, DeadlineWaiter, LedgerClient};
use fairswap_types::{AccountId, ClaimKind, FairswapError, Result, Share, TxHash, constants};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::orchestrator::ExchangeDescriptor;

/// How a claim ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimOutcome {
    Accepted(TxHash),
    /// The other transaction of the pair executed first.
    SiblingWon,
}

/// What a claimant did on which account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReport {
    pub party: AccountId,
    pub account: AccountId,
    pub kind: ClaimKind,
    pub outcome: ClaimOutcome,
}

impl ClaimReport {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, ClaimOutcome::Accepted(_))
    }

    /// Whether the outcome proves the ledger clock has reached τ. Only an
    /// executed main transaction does: a `SiblingWon` counter claim may
    /// have lost to the same counter transaction submitted earlier.
    #[must_use]
    pub fn implies_deadline_passed(&self) -> bool {
        matches!(
            (self.kind, self.outcome),
            (ClaimKind::Main, ClaimOutcome::Accepted(_))
        )
    }
}

/// One party of the exchange, acting independently of the orchestrator.
pub struct Claimant {
    party: AccountId,
    share: Share,
    descriptor: Arc<ExchangeDescriptor>,
    /// Index of the escrow paying this party its prize.
    own: usize,
    /// Index of the escrow paying this party its counterprize.
    other: usize,
    ledger: Arc<dyn LedgerClient>,
    waiter: DeadlineWaiter,
}

impl Claimant {
    /// # Errors
    /// - `InvalidConfig` if `party` is not a claimant of this exchange
    /// - `InvalidShare` if `share` does not open the party's own escrow
    pub fn new(
        party: AccountId,
        share: Share,
        descriptor: Arc<ExchangeDescriptor>,
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let not_a_party = || FairswapError::InvalidConfig {
            reason: format!("{party} is not a claimant in {}", descriptor.id),
        };
        let own = descriptor
            .escrows
            .iter()
            .position(|e| e.parties.claimant == party)
            .ok_or_else(not_a_party)?;
        let other = descriptor
            .escrows
            .iter()
            .position(|e| e.parties.counterparty == party)
            .ok_or_else(not_a_party)?;

        if !descriptor.escrows[own].commitment.opens(&share) {
            return Err(FairswapError::InvalidShare {
                reason: format!(
                    "share {} does not open the commitment on {}",
                    share.index, descriptor.escrows[own].account
                ),
            });
        }

        let waiter = DeadlineWaiter::new(
            Arc::clone(&ledger),
            clock,
            descriptor.clock_skew_margin,
            descriptor.retry.clone(),
        );
        Ok(Self {
            party,
            share,
            descriptor,
            own,
            other,
            ledger,
            waiter,
        })
    }

    #[must_use]
    pub fn party(&self) -> AccountId {
        self.party
    }

    #[must_use]
    pub fn own_escrow(&self) -> &SealedEscrow {
        &self.descriptor.escrows[self.own]
    }

    #[must_use]
    pub fn counter_escrow(&self) -> &SealedEscrow {
        &self.descriptor.escrows[self.other]
    }

    /// Give away this party's share. After this the other party can take
    /// the counterprize from our escrow before τ.
    #[must_use]
    pub fn leak(&self) -> Share {
        tracing::warn!(party = %self.party, index = self.share.index, "Leaking share");
        self.share.clone()
    }

    fn report(
        &self,
        escrow: &SealedEscrow,
        kind: ClaimKind,
        result: Result<TxHash>,
    ) -> Result<ClaimReport> {
        let outcome = match result {
            Ok(hash) => ClaimOutcome::Accepted(hash),
            Err(FairswapError::RaceLoss { account }) => {
                tracing::warn!(party = %self.party, account = %account, %kind, "Sibling transaction won the race");
                ClaimOutcome::SiblingWon
            }
            Err(e) => return Err(e),
        };
        Ok(ClaimReport {
            party: self.party,
            account: escrow.account,
            kind,
            outcome,
        })
    }

    /// Take the counterprize from the other party's escrow with its
    /// leaked share. Only valid before τ.
    ///
    /// # Errors
    /// - `InvalidShare` if `leaked` does not open that escrow's commitment
    /// - `WindowMiss { closed: true }` at or after τ
    pub async fn claim_counter(&self, leaked: &Share) -> Result<ClaimReport> {
        let escrow = self.counter_escrow();
        if !escrow.commitment.opens(leaked) {
            return Err(FairswapError::InvalidShare {
                reason: format!("leaked share does not open the commitment on {}", escrow.account),
            });
        }
        let result = submit_classified(
            self.ledger.as_ref(),
            &escrow.counter_tx,
            Some(&leaked.to_preimage()),
            &self.descriptor.retry,
        )
        .await;
        self.report(escrow, ClaimKind::Counter, result)
    }

    /// Wait until the ledger clock passes `τ + margin`, then reveal our
    /// share to take the prize. A "too early" answer means the ledger's
    /// clock lags ours; wait a little longer and retry.
    ///
    /// # Errors
    /// - `WindowMiss { closed: true }` once the main window has closed
    /// - `ThresholdFailure` if the ledger refuses our preimage
    pub async fn claim_main(&self) -> Result<ClaimReport> {
        let escrow = self.own_escrow();
        let preimage = self.share.to_preimage();
        let mut retries = 0u32;
        loop {
            self.waiter
                .wait_until(escrow.deadline.at + u64::from(retries))
                .await?;
            let result = submit_classified(
                self.ledger.as_ref(),
                &escrow.main_tx,
                Some(&preimage),
                &self.descriptor.retry,
            )
            .await;
            match result {
                Err(FairswapError::WindowMiss { closed: false, .. })
                    if retries < constants::MAIN_CLAIM_EARLY_RETRIES =>
                {
                    retries += 1;
                    tracing::warn!(party = %self.party, retries, "Main window not open yet, waiting longer");
                }
                other => return self.report(escrow, ClaimKind::Main, other),
            }
        }
    }

    /// Play the exchange: race the leak channel against the deadline.
    ///
    /// A share arriving before τ is used for a counter claim. Once τ passes
    /// the main claim is made either way. Returns every claim attempted.
    ///
    /// # Errors
    /// Any fatal claim error. Invalid leaked shares and counter claims that
    /// miss their window are logged and skipped.
    pub async fn run(&self, mut leaks: mpsc::Receiver<Share>) -> Result<Vec<ClaimReport>> {
        let mut reports = Vec::new();
        let deadline = self.waiter.wait_until(self.own_escrow().deadline.at);
        tokio::pin!(deadline);
        let mut listening = true;

        loop {
            tokio::select! {
                biased;
                leak = leaks.recv(), if listening => match leak {
                    Some(share) => match self.claim_counter(&share).await {
                        Ok(report) => {
                            reports.push(report);
                            listening = false;
                        }
                        Err(e @ (FairswapError::InvalidShare { .. } | FairswapError::WindowMiss { .. })) => {
                            tracing::warn!(party = %self.party, error = %e, "Counter claim skipped");
                        }
                        Err(e) => return Err(e),
                    },
                    None => listening = false,
                },
                waited = &mut deadline => {
                    waited?;
                    break;
                }
            }
        }

        reports.push(self.claim_main().await?);
        Ok(reports)
    }
}

impl std::fmt::Debug for Claimant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claimant")
            .field("party", &self.party)
            .field("share_index", &self.share.index)
            .finish_non_exhaustive()
    }
}
