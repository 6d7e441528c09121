//! Exchange orchestrator: the setup party's view of one fair exchange.
//!
//! The orchestrator never enforces who wins a race. It seals the two
//! escrow accounts, hands out the shares, and afterwards only *observes*:
//! claimants submit on their own and the ledger's sequence check decides.

use std::sync::Arc;
use std::time::Duration;

use fairswap_escrow::{
    Deadline, EscrowAccountPlan, EscrowTerms, PlanParties, SealedEscrow, SharingScheme, commit,
};
use fairswap_ledger::{LedgerClient, query};
use fairswap_types::{
    AccountId, Digest, ExchangeConfig, ExchangeId, ExchangeState, FairswapError, Keypair, Result,
    RetryPolicy, Secret, SetupStep, Share, unix_secs,
};
use serde::{Deserialize, Serialize};

use crate::party::ClaimReport;

/// Public description of a sealed exchange. Safe to hand to both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeDescriptor {
    pub id: ExchangeId,
    pub deadline: Deadline,
    /// Escrow `i` pays party `i` its prize and is locked by share `i + 1`.
    pub escrows: [SealedEscrow; 2],
    /// Out-of-band commitment to the whole secret.
    pub secret_digest: Digest,
    pub clock_skew_margin: Duration,
    pub retry: RetryPolicy,
}

impl ExchangeDescriptor {
    /// The escrow account paying `party` its prize.
    #[must_use]
    pub fn owned_by(&self, party: &AccountId) -> Option<&SealedEscrow> {
        self.escrows.iter().find(|e| e.parties.claimant == *party)
    }

    /// The escrow account whose counterprize goes to `party`.
    #[must_use]
    pub fn counter_for(&self, party: &AccountId) -> Option<&SealedEscrow> {
        self.escrows.iter().find(|e| e.parties.counterparty == *party)
    }

    #[must_use]
    pub fn position(&self, account: &AccountId) -> Option<usize> {
        self.escrows.iter().position(|e| e.account == *account)
    }
}

/// Drives one exchange through its lifecycle.
pub struct Exchange {
    id: ExchangeId,
    config: ExchangeConfig,
    ledger: Arc<dyn LedgerClient>,
    state: ExchangeState,
    descriptor: Option<Arc<ExchangeDescriptor>>,
    /// Escrow accounts known to have executed a claim.
    spent: [bool; 2],
    /// Keys of escrow accounts left funded but unsealed by a failed setup.
    recovery: Vec<Keypair>,
}

impl Exchange {
    /// # Errors
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(config: ExchangeConfig, ledger: Arc<dyn LedgerClient>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: ExchangeId::new(),
            config,
            ledger,
            state: ExchangeState::Setup,
            descriptor: None,
            spent: [false; 2],
            recovery: Vec::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Available once setup has sealed both accounts.
    #[must_use]
    pub fn descriptor(&self) -> Option<Arc<ExchangeDescriptor>> {
        self.descriptor.clone()
    }

    /// Escrow keys that still control funds after an aborted setup.
    #[must_use]
    pub fn recovery_keys(&self) -> &[Keypair] {
        &self.recovery
    }

    /// The recovery key for `account`, if setup left it funded but unsealed.
    #[must_use]
    pub fn recovery_key(&self, account: &AccountId) -> Option<&Keypair> {
        self.recovery.iter().find(|k| k.account_id() == *account)
    }

    fn transition(&mut self, to: ExchangeState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(FairswapError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::info!(
            exchange = %self.id,
            from = %self.state,
            to = %to,
            "Exchange state transition"
        );
        self.state = to;
        Ok(())
    }

    fn abort(&mut self, err: &FairswapError) {
        tracing::warn!(exchange = %self.id, error = %err, "Exchange setup aborted");
        self.state = ExchangeState::Aborted;
    }

    // =====================================================================
    // Setup
    // =====================================================================

    /// Split `secret`, seal one escrow account per party, and return the
    /// shares: share `i` goes to `parties[i]`.
    ///
    /// 1. Validate inputs (nothing written to the ledger on failure)
    /// 2. Split the secret 2-of-2 and commit to both shares
    /// 3. Fix τ from the ledger clock
    /// 4. Fund both escrow accounts in one transaction
    /// 5. Seal both accounts concurrently
    ///
    /// # Errors
    /// - `WrongState` unless the exchange is in `SETUP`
    /// - `InvalidConfig` for an empty secret or identical parties
    /// - `SetupFailure` (exchange `ABORTED`) naming the failing account
    pub async fn setup(
        &mut self,
        setup: &Keypair,
        parties: [AccountId; 2],
        secret: &Secret,
    ) -> Result<[Share; 2]> {
        // Step 1: validate
        if self.state != ExchangeState::Setup {
            return Err(FairswapError::WrongState {
                expected: ExchangeState::Setup,
                actual: self.state,
            });
        }
        if secret.is_empty() {
            return Err(FairswapError::InvalidConfig {
                reason: "secret must not be empty".to_string(),
            });
        }
        if parties[0] == parties[1] || parties.contains(&setup.account_id()) {
            return Err(FairswapError::InvalidConfig {
                reason: "setup party and both claimants must be distinct".to_string(),
            });
        }

        // Step 2: split and commit
        let [x1, x2]: [Share; 2] = SharingScheme::two_of_two()
            .split(secret)
            .try_into()
            .map_err(|_| FairswapError::Internal("2-of-2 split must yield two shares".into()))?;

        // Step 3: fix the deadline
        let ledger = Arc::clone(&self.ledger);
        let retry = self.config.retry.clone();
        let now = match query(&retry, "now", || ledger.now()).await {
            Ok(now) => now,
            Err(e) => {
                self.abort(&e);
                return Err(e);
            }
        };
        let Some(at) = unix_secs(now).checked_add(self.config.deadline_secs()) else {
            return Err(FairswapError::InvalidConfig {
                reason: format!(
                    "deadline offset {}s overflows the ledger clock",
                    self.config.deadline_secs()
                ),
            });
        };
        let deadline = Deadline {
            at,
            grace: self.config.grace_secs(),
        };

        let terms = EscrowTerms::from_config(&self.config);
        let plan = |share: &Share, claimant: AccountId, counterparty: AccountId| {
            EscrowAccountPlan::new(
                Keypair::random(),
                PlanParties {
                    setup: setup.account_id(),
                    claimant,
                    counterparty,
                },
                commit(share),
                terms,
                deadline,
            )
        };
        let mut plans = [
            plan(&x1, parties[0], parties[1]),
            plan(&x2, parties[1], parties[0]),
        ];

        // Steps 4-5: fund, then seal both
        let sealed = Self::fund_and_seal(&mut plans, ledger.as_ref(), setup, &retry).await;
        let escrows = match sealed {
            Ok(escrows) => escrows,
            Err(e) => {
                self.recovery = Self::unsealed_keys(&plans, ledger.as_ref(), &retry).await;
                self.abort(&e);
                return Err(e);
            }
        };

        self.descriptor = Some(Arc::new(ExchangeDescriptor {
            id: self.id,
            deadline,
            escrows,
            secret_digest: secret.digest(),
            clock_skew_margin: self.config.clock_skew_margin,
            retry,
        }));
        self.transition(ExchangeState::Sealed)?;
        tracing::info!(
            exchange = %self.id,
            deadline = deadline.at,
            grace = ?deadline.grace,
            "Exchange sealed, handing out shares"
        );
        self.transition(ExchangeState::AwaitingDeadline)?;
        Ok([x1, x2])
    }

    async fn fund_and_seal(
        plans: &mut [EscrowAccountPlan; 2],
        ledger: &dyn LedgerClient,
        setup: &Keypair,
        retry: &RetryPolicy,
    ) -> Result<[SealedEscrow; 2]> {
        EscrowAccountPlan::fund_all(plans, ledger, setup, retry).await?;
        let [a, b] = plans;
        let (a, b) = tokio::try_join!(a.seal(ledger, retry), b.seal(ledger, retry))?;
        Ok([a, b])
    }

    /// Keys of funded plans whose accounts the ledger still reports as
    /// unsealed. A plan interrupted mid-seal may have had its sealing
    /// transaction applied without recording it.
    async fn unsealed_keys(
        plans: &[EscrowAccountPlan],
        ledger: &dyn LedgerClient,
        retry: &RetryPolicy,
    ) -> Vec<Keypair> {
        let mut keys = Vec::new();
        for plan in plans {
            if !(SetupStep::Funded..SetupStep::Sealed).contains(&plan.step()) {
                continue;
            }
            let account = plan.account();
            match query(retry, "account", || ledger.account(&account)).await {
                Ok(snapshot) if snapshot.is_sealed() => {
                    tracing::warn!(
                        account = %account,
                        step = %plan.step(),
                        "Escrow account sealed by an aborted setup, funds locked until τ"
                    );
                }
                Ok(_) => keys.push(plan.escrow_keypair().clone()),
                Err(e) => {
                    tracing::warn!(account = %account, error = %e, "Could not confirm escrow state, keeping recovery key");
                    keys.push(plan.escrow_keypair().clone());
                }
            }
        }
        keys
    }

    // =====================================================================
    // Observation
    // =====================================================================

    fn target_state(&self, now: u64, deadline: &Deadline) -> ExchangeState {
        if self.spent.iter().all(|&s| s) {
            ExchangeState::Settled
        } else if deadline.expires_at().is_some_and(|end| now >= end) {
            ExchangeState::Expired
        } else if now >= deadline.at {
            ExchangeState::DeadlinePassed
        } else if self.spent.iter().any(|&s| s) {
            ExchangeState::EarlyClaimObserved
        } else {
            ExchangeState::AwaitingDeadline
        }
    }

    /// Step forward through valid transitions until `target` is reached.
    /// Targets behind the current state are ignored.
    fn advance_to(&mut self, target: ExchangeState, before_deadline: bool) -> Result<()> {
        use ExchangeState::{AwaitingDeadline, DeadlinePassed, EarlyClaimObserved, Expired, Settled};

        loop {
            let next = match (self.state, target) {
                (current, goal) if current == goal => return Ok(()),
                (AwaitingDeadline, EarlyClaimObserved) => EarlyClaimObserved,
                (AwaitingDeadline, Settled) if before_deadline => EarlyClaimObserved,
                (AwaitingDeadline, DeadlinePassed | Settled | Expired) => DeadlinePassed,
                (EarlyClaimObserved, Settled) => Settled,
                (EarlyClaimObserved, DeadlinePassed | Expired) => DeadlinePassed,
                (DeadlinePassed, Settled | Expired) => target,
                _ => return Ok(()),
            };
            self.transition(next)?;
            match next {
                Settled => tracing::info!(exchange = %self.id, "Both escrow accounts claimed"),
                Expired => tracing::warn!(
                    exchange = %self.id,
                    "Main window closed with an unclaimed escrow account"
                ),
                _ => {}
            }
        }
    }

    /// Reconcile the state with the ledger: which accounts have executed a
    /// claim, and where the ledger clock stands relative to τ and τ+Δ.
    ///
    /// # Errors
    /// `TransientLedger` if the ledger stays unreachable.
    pub async fn observe(&mut self) -> Result<ExchangeState> {
        let Some(descriptor) = self.descriptor.clone() else {
            return Ok(self.state);
        };
        if self.state.is_terminal() {
            return Ok(self.state);
        }

        let ledger = Arc::clone(&self.ledger);
        let retry = self.config.retry.clone();
        let now = unix_secs(query(&retry, "now", || ledger.now()).await?);
        for (i, escrow) in descriptor.escrows.iter().enumerate() {
            let sequence = query(&retry, "sequence", || ledger.sequence(&escrow.account)).await?;
            if sequence >= escrow.claim_sequence() {
                self.spent[i] = true;
            }
        }

        let target = self.target_state(now, &descriptor.deadline);
        self.advance_to(target, now < descriptor.deadline.at)?;
        Ok(self.state)
    }

    /// Fold a claimant's report into the state without a ledger round trip.
    ///
    /// # Errors
    /// - `WrongState` before setup has completed
    /// - `Internal` if the report names an account outside this exchange
    pub fn apply_report(&mut self, report: &ClaimReport) -> Result<ExchangeState> {
        let Some(descriptor) = self.descriptor.clone() else {
            return Err(FairswapError::WrongState {
                expected: ExchangeState::AwaitingDeadline,
                actual: self.state,
            });
        };
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        let index = descriptor.position(&report.account).ok_or_else(|| {
            FairswapError::Internal(format!("{} is not part of {}", report.account, self.id))
        })?;
        self.spent[index] = true;

        let after_deadline = report.implies_deadline_passed();
        let target = if self.spent.iter().all(|&s| s) {
            ExchangeState::Settled
        } else if after_deadline {
            ExchangeState::DeadlinePassed
        } else {
            ExchangeState::EarlyClaimObserved
        };
        self.advance_to(target, !after_deadline)?;
        Ok(self.state)
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("spent", &self.spent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairswap_ledger::{Funder, InMemoryLedger, ManualClock};
    use rust_decimal::Decimal;

    async fn exchange(config: ExchangeConfig) -> (Exchange, Arc<InMemoryLedger>, Keypair, [AccountId; 2]) {
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let ledger = Arc::new(InMemoryLedger::new(clock));
        let setup = Keypair::random();
        ledger.fund(&setup.account_id()).await.unwrap();
        let parties = [Keypair::random().account_id(), Keypair::random().account_id()];
        let exchange = Exchange::new(config, ledger.clone()).unwrap();
        (exchange, ledger, setup, parties)
    }

    #[test]
    fn invalid_config_rejected_up_front() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let ledger = Arc::new(InMemoryLedger::new(clock));
        let config = ExchangeConfig {
            counterprize: Decimal::ZERO,
            ..ExchangeConfig::demo()
        };
        assert!(matches!(
            Exchange::new(config, ledger),
            Err(FairswapError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn setup_hands_out_matching_shares() {
        let (mut ex, _, setup, parties) = exchange(ExchangeConfig::demo()).await;
        let shares = ex
            .setup(&setup, parties, &Secret::new(b"Hello, World!".to_vec()))
            .await
            .unwrap();
        assert_eq!(ex.state(), ExchangeState::AwaitingDeadline);

        let d = ex.descriptor().unwrap();
        assert_eq!(d.deadline.at, 1_030);
        assert_eq!(d.deadline.expires_at(), Some(4_630));
        for (i, share) in shares.iter().enumerate() {
            assert!(d.escrows[i].commitment.opens(share));
            assert_eq!(d.owned_by(&parties[i]).unwrap().account, d.escrows[i].account);
            assert_eq!(d.counter_for(&parties[1 - i]).unwrap().account, d.escrows[i].account);
        }
        assert!(ex.recovery_keys().is_empty());
    }

    #[tokio::test]
    async fn second_setup_is_wrong_state() {
        let (mut ex, _, setup, parties) = exchange(ExchangeConfig::demo()).await;
        let secret = Secret::new(b"s".to_vec());
        ex.setup(&setup, parties, &secret).await.unwrap();
        assert!(matches!(
            ex.setup(&setup, parties, &secret).await,
            Err(FairswapError::WrongState { .. })
        ));
    }

    #[tokio::test]
    async fn bad_inputs_do_not_abort() {
        let (mut ex, _, setup, parties) = exchange(ExchangeConfig::demo()).await;
        let err = ex.setup(&setup, parties, &Secret::new(Vec::new())).await.unwrap_err();
        assert!(matches!(err, FairswapError::InvalidConfig { .. }));
        let err = ex
            .setup(&setup, [parties[0], parties[0]], &Secret::new(b"s".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, FairswapError::InvalidConfig { .. }));
        assert_eq!(ex.state(), ExchangeState::Setup);
    }

    #[tokio::test]
    async fn underfunded_setup_aborts() {
        let config = ExchangeConfig {
            funding_amount: Decimal::new(6_000, 0),
            ..ExchangeConfig::demo()
        };
        let (mut ex, _, setup, parties) = exchange(config).await;
        let err = ex
            .setup(&setup, parties, &Secret::new(b"s".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FairswapError::SetupFailure {
                last_step: SetupStep::Planned,
                ..
            }
        ));
        assert_eq!(ex.state(), ExchangeState::Aborted);
        assert!(ex.descriptor().is_none());
        // Funding never applied, so nothing is left to recover.
        assert!(ex.recovery_keys().is_empty());
    }

    #[tokio::test]
    async fn overflowing_deadline_is_rejected_before_funding() {
        let config = ExchangeConfig {
            deadline_offset: Duration::from_secs(u64::MAX),
            ..ExchangeConfig::demo()
        };
        let (mut ex, ledger, setup, parties) = exchange(config).await;
        let err = ex
            .setup(&setup, parties, &Secret::new(b"s".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, FairswapError::InvalidConfig { .. }));
        assert_eq!(ex.state(), ExchangeState::Setup);
        assert_eq!(
            ledger.balance(&setup.account_id()).await,
            Some(Decimal::from(fairswap_types::constants::FAUCET_AMOUNT))
        );
    }

    #[tokio::test]
    async fn observe_before_setup_is_a_no_op() {
        let (mut ex, _, _, _) = exchange(ExchangeConfig::demo()).await;
        assert_eq!(ex.observe().await.unwrap(), ExchangeState::Setup);
    }

    #[test]
    fn advance_walks_through_intermediate_states() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let ledger = Arc::new(InMemoryLedger::new(clock));
        let mut ex = Exchange::new(ExchangeConfig::demo(), ledger).unwrap();
        ex.state = ExchangeState::AwaitingDeadline;

        ex.advance_to(ExchangeState::Expired, false).unwrap();
        assert_eq!(ex.state(), ExchangeState::Expired);

        ex.state = ExchangeState::AwaitingDeadline;
        ex.advance_to(ExchangeState::Settled, true).unwrap();
        assert_eq!(ex.state(), ExchangeState::Settled);

        // A target behind the current state leaves it alone.
        ex.state = ExchangeState::DeadlinePassed;
        ex.advance_to(ExchangeState::EarlyClaimObserved, false).unwrap();
        assert_eq!(ex.state(), ExchangeState::DeadlinePassed);
    }
}
