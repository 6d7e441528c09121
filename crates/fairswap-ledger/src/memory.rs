//! In-memory reference ledger.
//!
//! Enforces the parts of the ledger contract the protocol relies on:
//!
//! 1. The source account must exist and the transaction must carry at
//!    least one operation
//! 2. `sequence == account.sequence + 1`, else `BadSequence`
//! 3. Collected signer weight `>= max(threshold, 1)` for the strongest
//!    operation class, judged against the pre-transaction signer set
//! 4. Ledger time inside the half-open window `[min, max)`
//! 5. Operations apply atomically on a staged copy; a pre-authorized signer
//!    is consumed when its transaction applies
//!
//! The check order makes a stale sibling always report `BadSequence` and a
//! wrong preimage always report `ThresholdNotMet`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fairswap_types::{
    AccountId, AccountSnapshot, DecoratedSignature, Operation, SetOptions, Signer, Thresholds,
    TransactionEnvelope, TxHash, constants, unix_secs, verify_signature,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::client::{Funder, LedgerClient, LedgerError, LedgerRecord, Rejection};
use crate::clock::Clock;

/// Mutable ledger state, guarded by one lock.
#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, AccountSnapshot>,
    /// Accepted transactions per source account, oldest first.
    history: HashMap<AccountId, Vec<LedgerRecord>>,
    /// Ledger close counter. New accounts start at `ledger_seq << 32`.
    ledger_seq: u64,
    /// Calls that succeed before scheduled outages begin.
    healthy_calls: u32,
    /// Calls left to fail with `Unavailable`.
    outages: u32,
}

impl LedgerState {
    fn take_outage(&mut self) -> bool {
        if self.outages == 0 {
            return false;
        }
        if self.healthy_calls > 0 {
            self.healthy_calls -= 1;
            return false;
        }
        self.outages -= 1;
        true
    }

    fn new_account(&self, id: AccountId, balance: Decimal) -> AccountSnapshot {
        AccountSnapshot {
            id,
            sequence: self.ledger_seq << 32,
            balance,
            master_weight: 1,
            thresholds: Thresholds::default(),
            signers: Vec::new(),
        }
    }

    /// Validate `envelope` and, if it passes, apply it.
    fn check_and_apply(
        &mut self,
        envelope: &TransactionEnvelope,
        hash: TxHash,
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        let tx = &envelope.transaction;

        // Step 1: source account
        let source = self
            .accounts
            .get(&tx.source)
            .ok_or(Rejection::AccountNotFound(tx.source))?;
        if tx.operations.is_empty() {
            return Err(Rejection::Malformed("transaction has no operations".into()));
        }

        // Step 2: sequence
        let expected = source.sequence + 1;
        if tx.sequence != expected {
            return Err(Rejection::BadSequence {
                expected,
                got: tx.sequence,
            });
        }

        // Step 3: signature weight against the current signer set
        let weight = collected_weight(source, envelope, &hash);
        let required = u32::from(source.thresholds.for_class(tx.threshold_class()).max(1));
        if weight < required {
            return Err(Rejection::ThresholdNotMet { required, weight });
        }

        // Step 4: time window
        let now_secs = unix_secs(now);
        if !tx.time_window.contains(now_secs) {
            return Err(Rejection::OutsideTimeWindow {
                window: tx.time_window,
                now: now_secs,
            });
        }

        // Step 5: apply on a staged copy, then commit
        let mut staged = self.accounts.clone();
        for op in &tx.operations {
            self.apply_operation(&mut staged, tx.source, op)?;
        }
        if let Some(account) = staged.get_mut(&tx.source) {
            account.sequence = tx.sequence;
            account
                .signers
                .retain(|s| !matches!(s, Signer::PreAuthorizedTx { hash: h, .. } if *h == hash));
        }

        self.accounts = staged;
        self.ledger_seq += 1;
        self.history.entry(tx.source).or_default().push(LedgerRecord {
            hash,
            source: tx.source,
            sequence: tx.sequence,
            signatures: envelope.signatures.clone(),
            applied_at: now,
        });
        Ok(())
    }

    fn apply_operation(
        &self,
        staged: &mut HashMap<AccountId, AccountSnapshot>,
        source: AccountId,
        op: &Operation,
    ) -> Result<(), Rejection> {
        match op {
            Operation::CreateAccount {
                destination,
                starting_balance,
            } => {
                if *starting_balance <= Decimal::ZERO {
                    return Err(Rejection::Malformed(format!(
                        "starting balance must be positive, got {starting_balance}"
                    )));
                }
                if staged.contains_key(destination) {
                    return Err(Rejection::Malformed(format!("{destination} already exists")));
                }
                debit(staged, source, *starting_balance)?;
                staged.insert(
                    *destination,
                    self.new_account(*destination, *starting_balance),
                );
            }
            Operation::Payment {
                destination,
                amount,
            } => {
                if *amount <= Decimal::ZERO {
                    return Err(Rejection::Malformed(format!(
                        "payment amount must be positive, got {amount}"
                    )));
                }
                if !staged.contains_key(destination) {
                    return Err(Rejection::AccountNotFound(*destination));
                }
                debit(staged, source, *amount)?;
                if let Some(dest) = staged.get_mut(destination) {
                    dest.balance += *amount;
                }
            }
            Operation::SetOptions(opts) => {
                let account = staged
                    .get_mut(&source)
                    .ok_or(Rejection::AccountNotFound(source))?;
                apply_set_options(account, opts);
            }
        }
        Ok(())
    }
}

fn debit(
    staged: &mut HashMap<AccountId, AccountSnapshot>,
    account: AccountId,
    amount: Decimal,
) -> Result<(), Rejection> {
    let entry = staged
        .get_mut(&account)
        .ok_or(Rejection::AccountNotFound(account))?;
    if entry.balance < amount {
        return Err(Rejection::InsufficientBalance {
            account,
            needed: amount,
            available: entry.balance,
        });
    }
    entry.balance -= amount;
    Ok(())
}

fn apply_set_options(account: &mut AccountSnapshot, opts: &SetOptions) {
    if let Some(w) = opts.master_weight {
        account.master_weight = w;
    }
    if let Some(t) = opts.low_threshold {
        account.thresholds.low = t;
    }
    if let Some(t) = opts.medium_threshold {
        account.thresholds.medium = t;
    }
    if let Some(t) = opts.high_threshold {
        account.thresholds.high = t;
    }
    match opts.signer {
        None => {}
        Some(Signer::MasterKey { weight }) => account.master_weight = weight,
        Some(signer) => {
            account.signers.retain(|s| !s.same_key(&signer));
            if signer.weight() > 0 {
                account.signers.push(signer);
            }
        }
    }
}

/// Sum of weights of every signer the envelope satisfies.
fn collected_weight(account: &AccountSnapshot, envelope: &TransactionEnvelope, hash: &TxHash) -> u32 {
    let master_signed = envelope.signatures.iter().any(|s| match s {
        DecoratedSignature::Ed25519 { signer, signature } => {
            *signer == account.id && verify_signature(signer, hash, signature)
        }
        DecoratedSignature::HashPreimage(_) => false,
    });
    let mut weight = if master_signed {
        u32::from(account.master_weight)
    } else {
        0
    };
    for signer in &account.signers {
        let satisfied = match signer {
            Signer::MasterKey { .. } => false,
            Signer::PreAuthorizedTx { hash: h, .. } => h == hash,
            Signer::HashPreimage { digest, .. } => envelope.preimages().any(|p| digest.matches(p)),
        };
        if satisfied {
            weight += u32::from(signer.weight());
        }
    }
    weight
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

/// Reference ledger held in memory, timed by an injectable [`Clock`].
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    clock: Arc<dyn Clock>,
    faucet_amount: Decimal,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                ledger_seq: 1,
                ..LedgerState::default()
            }),
            clock,
            faucet_amount: Decimal::from(constants::FAUCET_AMOUNT),
        }
    }

    #[must_use]
    pub fn with_faucet_amount(mut self, amount: Decimal) -> Self {
        self.faucet_amount = amount;
        self
    }

    /// Make the next `calls` ledger calls fail with a transient error.
    pub async fn inject_outages(&self, calls: u32) {
        self.inject_outages_after(0, calls).await;
    }

    /// Let `healthy` calls through, then fail the following `calls`.
    pub async fn inject_outages_after(&self, healthy: u32, calls: u32) {
        let mut state = self.state.lock().await;
        state.healthy_calls = healthy;
        state.outages = calls;
    }

    /// Balance of `account`, if it exists.
    pub async fn balance(&self, account: &AccountId) -> Option<Decimal> {
        self.state
            .lock()
            .await
            .accounts
            .get(account)
            .map(|a| a.balance)
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("faucet_amount", &self.faucet_amount)
            .finish_non_exhaustive()
    }
}

fn unavailable() -> LedgerError {
    LedgerError::Unavailable("injected outage".into())
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit(&self, envelope: &TransactionEnvelope) -> Result<TxHash, Rejection> {
        let mut state = self.state.lock().await;
        if state.take_outage() {
            return Err(Rejection::LedgerUnavailable("injected outage".into()));
        }

        let hash = envelope.hash();
        let now = self.clock.now();
        match state.check_and_apply(envelope, hash, now) {
            Ok(()) => {
                tracing::debug!(
                    tx = %hash,
                    account = %envelope.transaction.source,
                    sequence = envelope.transaction.sequence,
                    "Ledger accepted transaction"
                );
                Ok(hash)
            }
            Err(rejection) => {
                tracing::debug!(
                    tx = %hash,
                    account = %envelope.transaction.source,
                    %rejection,
                    "Ledger rejected transaction"
                );
                Err(rejection)
            }
        }
    }

    async fn sequence(&self, account: &AccountId) -> Result<u64, LedgerError> {
        self.account(account).await.map(|a| a.sequence)
    }

    async fn account(&self, account: &AccountId) -> Result<AccountSnapshot, LedgerError> {
        let mut state = self.state.lock().await;
        if state.take_outage() {
            return Err(unavailable());
        }
        state
            .accounts
            .get(account)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(*account))
    }

    async fn recent_transactions(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        let mut state = self.state.lock().await;
        if state.take_outage() {
            return Err(unavailable());
        }
        if !state.accounts.contains_key(account) {
            return Err(LedgerError::AccountNotFound(*account));
        }
        Ok(state
            .history
            .get(account)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn now(&self) -> Result<DateTime<Utc>, LedgerError> {
        if self.state.lock().await.take_outage() {
            return Err(unavailable());
        }
        Ok(self.clock.now())
    }
}

#[async_trait]
impl Funder for InMemoryLedger {
    async fn fund(&self, account: &AccountId) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if state.take_outage() {
            return Err(unavailable());
        }
        if state.accounts.contains_key(account) {
            return Err(LedgerError::Refused(format!("{account} already exists")));
        }
        let snapshot = state.new_account(*account, self.faucet_amount);
        state.accounts.insert(*account, snapshot);
        state.ledger_seq += 1;
        tracing::debug!(account = %account, amount = %self.faucet_amount, "Faucet funded account");
        Ok(())
    }
}
