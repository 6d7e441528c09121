//! Escrow account plan: fund, build the transaction pair, seal.
//!
//! ```text
//!   PLANNED ──fund──▶ FUNDED ──read seq c──▶ SEQUENCE_READ
//!       ──build pair at c+2──▶ TRANSACTIONS_BUILT ──seal at c+1──▶ SEALED
//! ```
//!
//! The sealing transaction is the account's last master-signed act. It
//! raises the master weight so the high-threshold changes inside it pass,
//! installs thresholds and signers, and finally drops the master weight to
//! zero. After it applies, only the two pre-authorized transactions can
//! move the funds, each needing the bound share as a preimage.

use fairswap_ledger::{LedgerClient, query, with_retry};
use fairswap_types::{
    AccountId, ClaimKind, Commitment, ConditionalTransaction, ExchangeConfig, FairswapError,
    Keypair, Operation, Result, RetryPolicy, SetOptions, SetupStep, Signer, TimeWindow,
    Transaction, TxHash, constants,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payout amounts for one escrow account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTerms {
    pub prize: Decimal,
    pub pawn: Decimal,
    pub counterprize: Decimal,
    pub funding: Decimal,
}

impl EscrowTerms {
    #[must_use]
    pub fn from_config(config: &ExchangeConfig) -> Self {
        Self {
            prize: config.prize,
            pawn: config.pawn,
            counterprize: config.counterprize,
            funding: config.funding_amount,
        }
    }
}

/// Who pays and who is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanParties {
    /// Funds the account and receives the pawn back.
    pub setup: AccountId,
    /// Receives the prize through the main transaction.
    pub claimant: AccountId,
    /// Receives the counterprize through the counter transaction.
    pub counterparty: AccountId,
}

/// The deadline τ and the optional grace Δ after it, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub at: u64,
    pub grace: Option<u64>,
}

impl Deadline {
    /// `[0, τ)`.
    #[must_use]
    pub fn counter_window(&self) -> TimeWindow {
        TimeWindow::before(self.at)
    }

    /// `[τ, τ+Δ)`, or `[τ, ∞)` without a grace period.
    #[must_use]
    pub fn main_window(&self) -> TimeWindow {
        TimeWindow::between(self.at, self.grace.map(|g| self.at.saturating_add(g)))
    }

    /// When the main window closes, if ever.
    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.main_window().max_time
    }
}

/// Descriptor of a sealed escrow account. Everything a claimant or an
/// observer needs; the transactions are built but unsubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEscrow {
    pub account: AccountId,
    pub parties: PlanParties,
    pub commitment: Commitment,
    pub deadline: Deadline,
    /// Account sequence right after sealing.
    pub sealed_sequence: u64,
    pub counter_tx: ConditionalTransaction,
    pub main_tx: ConditionalTransaction,
}

impl SealedEscrow {
    /// The sequence both conditional transactions share.
    #[must_use]
    pub fn claim_sequence(&self) -> u64 {
        self.sealed_sequence + 1
    }

    #[must_use]
    pub fn transaction(&self, kind: ClaimKind) -> &ConditionalTransaction {
        match kind {
            ClaimKind::Counter => &self.counter_tx,
            ClaimKind::Main => &self.main_tx,
        }
    }

    /// Which of the pair carries `hash`, if either.
    #[must_use]
    pub fn kind_of(&self, hash: &TxHash) -> Option<ClaimKind> {
        [&self.counter_tx, &self.main_tx]
            .into_iter()
            .find(|tx| tx.identity_hash() == *hash)
            .map(|tx| tx.kind)
    }
}

/// Sets up one escrow account. Tracks the last step that succeeded so a
/// failure can say how far it got.
pub struct EscrowAccountPlan {
    escrow: Keypair,
    parties: PlanParties,
    commitment: Commitment,
    terms: EscrowTerms,
    deadline: Deadline,
    step: SetupStep,
}

impl EscrowAccountPlan {
    /// Pure construction; nothing touches the ledger yet.
    #[must_use]
    pub fn new(
        escrow: Keypair,
        parties: PlanParties,
        commitment: Commitment,
        terms: EscrowTerms,
        deadline: Deadline,
    ) -> Self {
        Self {
            escrow,
            parties,
            commitment,
            terms,
            deadline,
            step: SetupStep::Planned,
        }
    }

    #[must_use]
    pub fn account(&self) -> AccountId {
        self.escrow.account_id()
    }

    #[must_use]
    pub fn step(&self) -> SetupStep {
        self.step
    }

    #[must_use]
    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    /// The escrow key. Live until the account is sealed, so it can recover
    /// funds from an aborted setup.
    #[must_use]
    pub fn escrow_keypair(&self) -> &Keypair {
        &self.escrow
    }

    fn failure(&self, reason: impl Into<String>) -> FairswapError {
        FairswapError::SetupFailure {
            account: self.account(),
            last_step: self.step,
            reason: reason.into(),
        }
    }

    fn create_operation(&self) -> Operation {
        Operation::CreateAccount {
            destination: self.account(),
            starting_balance: self.terms.funding,
        }
    }

    /// Fund this account alone from the setup party.
    pub async fn fund(
        &mut self,
        ledger: &dyn LedgerClient,
        setup: &Keypair,
        retry: &RetryPolicy,
    ) -> Result<TxHash> {
        Self::fund_all(std::slice::from_mut(self), ledger, setup, retry).await
    }

    /// Fund every plan with a single transaction from the setup party.
    ///
    /// All plans share one payer, whose own sequence number would make
    /// separate funding transactions race each other.
    ///
    /// # Errors
    /// `SetupFailure` naming the first plan's account if the setup party's
    /// sequence cannot be read or the funding transaction is rejected.
    pub async fn fund_all(
        plans: &mut [EscrowAccountPlan],
        ledger: &dyn LedgerClient,
        setup: &Keypair,
        retry: &RetryPolicy,
    ) -> Result<TxHash> {
        let Some(first) = plans.first() else {
            return Err(FairswapError::Internal("no escrow plans to fund".into()));
        };
        if let Some(plan) = plans.iter().find(|p| p.step != SetupStep::Planned) {
            return Err(plan.failure("account already funded"));
        }

        let payer = setup.account_id();
        let sequence = query(retry, "sequence", || ledger.sequence(&payer))
            .await
            .map_err(|e| first.failure(format!("reading setup party sequence: {e}")))?;

        let tx = Transaction {
            source: payer,
            sequence: sequence + 1,
            operations: plans.iter().map(EscrowAccountPlan::create_operation).collect(),
            time_window: TimeWindow::unbounded(),
        };
        let mut envelope = tx.into_envelope();
        envelope.sign(setup);

        let hash = with_retry(retry, "fund", || ledger.submit(&envelope))
            .await
            .map_err(|e| {
                let reason = match e {
                    fairswap_ledger::RetryError::Permanent(r) => r.to_string(),
                    fairswap_ledger::RetryError::Exhausted { attempts, last } => {
                        format!("{last} after {attempts} attempts")
                    }
                };
                first.failure(format!("funding rejected: {reason}"))
            })?;

        for plan in plans.iter_mut() {
            plan.step = SetupStep::Funded;
            tracing::info!(
                account = %plan.account(),
                amount = %plan.terms.funding,
                tx = %hash,
                "Escrow account funded"
            );
        }
        Ok(hash)
    }

    fn build_pair(&self, claim_sequence: u64) -> (ConditionalTransaction, ConditionalTransaction) {
        let source = self.account();

        let counter = Transaction {
            source,
            sequence: claim_sequence,
            operations: vec![Operation::Payment {
                destination: self.parties.counterparty,
                amount: self.terms.counterprize,
            }],
            time_window: self.deadline.counter_window(),
        };

        let mut main_ops = vec![Operation::Payment {
            destination: self.parties.claimant,
            amount: self.terms.prize,
        }];
        if self.terms.pawn > Decimal::ZERO {
            main_ops.push(Operation::Payment {
                destination: self.parties.setup,
                amount: self.terms.pawn,
            });
        }
        let main = Transaction {
            source,
            sequence: claim_sequence,
            operations: main_ops,
            time_window: self.deadline.main_window(),
        };

        (
            ConditionalTransaction {
                kind: ClaimKind::Counter,
                transaction: counter,
                commitment: self.commitment,
            },
            ConditionalTransaction {
                kind: ClaimKind::Main,
                transaction: main,
                commitment: self.commitment,
            },
        )
    }

    fn sealing_transaction(
        &self,
        sequence: u64,
        counter: &ConditionalTransaction,
        main: &ConditionalTransaction,
    ) -> Transaction {
        let signer = |signer| {
            Operation::SetOptions(SetOptions {
                signer: Some(signer),
                ..SetOptions::default()
            })
        };
        Transaction {
            source: self.account(),
            sequence,
            operations: vec![
                Operation::SetOptions(SetOptions {
                    master_weight: Some(constants::SETUP_MASTER_WEIGHT),
                    ..SetOptions::default()
                }),
                Operation::SetOptions(SetOptions {
                    low_threshold: Some(constants::SEALED_LOW_THRESHOLD),
                    medium_threshold: Some(constants::SEALED_MEDIUM_THRESHOLD),
                    high_threshold: Some(constants::SEALED_HIGH_THRESHOLD),
                    ..SetOptions::default()
                }),
                signer(Signer::PreAuthorizedTx {
                    hash: counter.identity_hash(),
                    weight: constants::PRE_AUTH_SIGNER_WEIGHT,
                }),
                signer(Signer::PreAuthorizedTx {
                    hash: main.identity_hash(),
                    weight: constants::PRE_AUTH_SIGNER_WEIGHT,
                }),
                signer(Signer::HashPreimage {
                    digest: self.commitment.digest,
                    weight: constants::HASH_PREIMAGE_SIGNER_WEIGHT,
                }),
                Operation::SetOptions(SetOptions {
                    master_weight: Some(constants::SEALED_MASTER_WEIGHT),
                    ..SetOptions::default()
                }),
            ],
            time_window: TimeWindow::unbounded(),
        }
    }

    /// Read the sequence, build the pair, and seal the account.
    ///
    /// 1. Read current sequence `c`
    /// 2. Build counter and main transactions at `c + 2`
    /// 3. Submit the sealing transaction at `c + 1`
    /// 4. Confirm the ledger reports the sealed signer set
    ///
    /// # Errors
    /// `SetupFailure` carrying the last completed step.
    pub async fn seal(&mut self, ledger: &dyn LedgerClient, retry: &RetryPolicy) -> Result<SealedEscrow> {
        if self.step != SetupStep::Funded {
            return Err(self.failure("seal requires a funded, unsealed account"));
        }
        let account = self.account();

        // Step 1: read sequence
        let current = query(retry, "sequence", || ledger.sequence(&account))
            .await
            .map_err(|e| self.failure(format!("reading sequence: {e}")))?;
        self.step = SetupStep::SequenceRead;

        // Step 2: build the pair
        let sealed_sequence = current + 1;
        let (counter_tx, main_tx) = self.build_pair(sealed_sequence + 1);
        self.step = SetupStep::TransactionsBuilt;

        // Step 3: seal
        let mut envelope = self
            .sealing_transaction(sealed_sequence, &counter_tx, &main_tx)
            .into_envelope();
        envelope.sign(&self.escrow);
        let hash = with_retry(retry, "seal", || ledger.submit(&envelope))
            .await
            .map_err(|e| {
                self.failure(match e {
                    fairswap_ledger::RetryError::Permanent(r) => format!("sealing rejected: {r}"),
                    fairswap_ledger::RetryError::Exhausted { attempts, last } => {
                        format!("sealing failed after {attempts} attempts: {last}")
                    }
                })
            })?;

        // Step 4: confirm
        let snapshot = query(retry, "account", || ledger.account(&account))
            .await
            .map_err(|e| self.failure(format!("confirming seal: {e}")))?;
        if !snapshot.is_sealed() || snapshot.sequence != sealed_sequence {
            return Err(self.failure(format!(
                "ledger does not report a sealed account at sequence {sealed_sequence}"
            )));
        }
        self.step = SetupStep::Sealed;

        tracing::info!(
            account = %account,
            tx = %hash,
            sealed_sequence,
            counter_tx = %counter_tx.identity_hash(),
            main_tx = %main_tx.identity_hash(),
            "Escrow account sealed"
        );

        Ok(SealedEscrow {
            account,
            parties: self.parties,
            commitment: self.commitment,
            deadline: self.deadline,
            sealed_sequence,
            counter_tx,
            main_tx,
        })
    }
}

impl std::fmt::Debug for EscrowAccountPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowAccountPlan")
            .field("account", &self.account())
            .field("step", &self.step)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
