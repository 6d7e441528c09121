//! Escrow account lifecycle against the in-memory ledger:
//!
//! fund → seal → one of the pair executes → account stays spent

use std::sync::Arc;
use std::time::Duration;

use fairswap_escrow::{
    Deadline, EscrowAccountPlan, EscrowTerms, PlanParties, SealedEscrow, SharingScheme, commit,
    submit, submit_classified,
};
use fairswap_ledger::{Funder, InMemoryLedger, LedgerClient, ManualClock, Rejection};
use fairswap_types::{
    ClaimKind, FairswapError, Keypair, Operation, RetryPolicy, Secret, SetupStep, Share,
    Transaction, TimeWindow,
};
use rust_decimal::Decimal;

const START: i64 = 1_000;
const TAU: u64 = 1_030;
const GRACE: u64 = 3_600;

struct Harness {
    clock: Arc<ManualClock>,
    ledger: Arc<InMemoryLedger>,
    setup: Keypair,
    alice: Keypair,
    bob: Keypair,
    retry: RetryPolicy,
}

impl Harness {
    async fn new() -> Self {
        let clock = Arc::new(ManualClock::at_unix(START));
        let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
        let [setup, alice, bob] = [Keypair::random(), Keypair::random(), Keypair::random()];
        for kp in [&setup, &alice, &bob] {
            ledger.fund(&kp.account_id()).await.unwrap();
        }
        Self {
            clock,
            ledger,
            setup,
            alice,
            bob,
            retry: RetryPolicy::immediate(3),
        }
    }

    fn plan(&self, share: &Share) -> EscrowAccountPlan {
        EscrowAccountPlan::new(
            Keypair::random(),
            PlanParties {
                setup: self.setup.account_id(),
                claimant: self.alice.account_id(),
                counterparty: self.bob.account_id(),
            },
            commit(share),
            EscrowTerms {
                prize: Decimal::new(100, 0),
                pawn: Decimal::new(100, 0),
                counterprize: Decimal::ONE,
                funding: Decimal::new(20_250_009, 5),
            },
            Deadline {
                at: TAU,
                grace: Some(GRACE),
            },
        )
    }

    /// Alice's escrow account, locked by share 1.
    async fn sealed(&self) -> (SealedEscrow, [Share; 2]) {
        let (sealed, shares, _) = self.sealed_with_key().await;
        (sealed, shares)
    }

    /// [`Harness::sealed`], plus the escrow account's own keypair.
    async fn sealed_with_key(&self) -> (SealedEscrow, [Share; 2], Keypair) {
        let shares = SharingScheme::two_of_two().split(&Secret::new(b"Hello, World!".to_vec()));
        let mut plan = self.plan(&shares[0]);
        plan.fund(self.ledger.as_ref(), &self.setup, &self.retry)
            .await
            .unwrap();
        let sealed = plan.seal(self.ledger.as_ref(), &self.retry).await.unwrap();
        let [a, b]: [Share; 2] = shares.try_into().unwrap();
        (sealed, [a, b], plan.escrow_keypair().clone())
    }

    fn at(&self, unix: u64) {
        self.clock
            .set(chrono::DateTime::from_timestamp(unix as i64, 0).unwrap());
    }
}

// =========================================================================
// Sealing
// =========================================================================

#[tokio::test]
async fn sealed_account_matches_descriptor() {
    let h = Harness::new().await;
    let (sealed, _) = h.sealed().await;

    let snapshot = h.ledger.account(&sealed.account).await.unwrap();
    assert!(snapshot.is_sealed());
    assert_eq!(snapshot.master_weight, 0);
    assert_eq!(snapshot.sequence, sealed.sealed_sequence);
    assert_eq!(snapshot.balance, Decimal::new(20_250_009, 5));
    assert_eq!(sealed.counter_tx.sequence(), sealed.claim_sequence());
    assert_eq!(sealed.main_tx.sequence(), sealed.claim_sequence());
    assert_eq!(sealed.counter_tx.time_window(), TimeWindow::before(TAU));
}

#[tokio::test]
async fn setup_party_cannot_drain_sealed_account() {
    let h = Harness::new().await;
    let (sealed, _, escrow) = h.sealed_with_key().await;
    let drain = || Transaction {
        source: sealed.account,
        sequence: sealed.claim_sequence(),
        operations: vec![Operation::Payment {
            destination: h.setup.account_id(),
            amount: Decimal::new(200, 0),
        }],
        time_window: TimeWindow::unbounded(),
    };

    // The escrow master key is zero-weight once sealed
    let mut envelope = drain().into_envelope();
    envelope.sign(&escrow);
    let err = h.ledger.submit(&envelope).await.unwrap_err();
    assert!(matches!(err, Rejection::ThresholdNotMet { weight: 0, .. }));
    let snapshot = h.ledger.account(&sealed.account).await.unwrap();
    assert_eq!(snapshot.master_weight, 0);

    // The setup party was never a signer
    let mut envelope = drain().into_envelope();
    envelope.sign(&h.setup);
    let err = h.ledger.submit(&envelope).await.unwrap_err();
    assert!(matches!(err, Rejection::ThresholdNotMet { weight: 0, .. }));
    assert_eq!(
        h.ledger.balance(&sealed.account).await,
        Some(Decimal::new(20_250_009, 5))
    );
}

#[tokio::test]
async fn seal_without_funding_fails_at_planned() {
    let h = Harness::new().await;
    let shares = SharingScheme::two_of_two().split(&Secret::new(b"x".to_vec()));
    let mut plan = h.plan(&shares[0]);
    let err = plan.seal(h.ledger.as_ref(), &h.retry).await.unwrap_err();
    assert!(matches!(
        err,
        FairswapError::SetupFailure {
            last_step: SetupStep::Planned,
            ..
        }
    ));
}

#[tokio::test]
async fn underfunded_setup_party_fails_funding() {
    let h = Harness::new().await;
    let poor = Keypair::random();
    let ledger = InMemoryLedger::new(h.clock.clone()).with_faucet_amount(Decimal::TEN);
    ledger.fund(&poor.account_id()).await.unwrap();

    let shares = SharingScheme::two_of_two().split(&Secret::new(b"x".to_vec()));
    let mut plan = h.plan(&shares[0]);
    let err = plan.fund(&ledger, &poor, &h.retry).await.unwrap_err();
    match err {
        FairswapError::SetupFailure {
            account,
            last_step,
            reason,
        } => {
            assert_eq!(account, plan.account());
            assert_eq!(last_step, SetupStep::Planned);
            assert!(reason.contains("insufficient balance"), "{reason}");
        }
        other => panic!("expected setup failure, got {other}"),
    }
    assert_eq!(plan.step(), SetupStep::Planned);
}

#[tokio::test]
async fn sealing_survives_transient_outages() {
    let h = Harness::new().await;
    let shares = SharingScheme::two_of_two().split(&Secret::new(b"x".to_vec()));
    let mut plan = h.plan(&shares[0]);
    plan.fund(h.ledger.as_ref(), &h.setup, &h.retry).await.unwrap();

    h.ledger.inject_outages(2).await;
    plan.seal(h.ledger.as_ref(), &h.retry).await.unwrap();
    assert_eq!(plan.step(), SetupStep::Sealed);
}

#[tokio::test]
async fn fund_all_funds_both_accounts_in_one_transaction() {
    let h = Harness::new().await;
    let shares = SharingScheme::two_of_two().split(&Secret::new(b"x".to_vec()));
    let mut plans = [h.plan(&shares[0]), h.plan(&shares[1])];
    let before = h.ledger.sequence(&h.setup.account_id()).await.unwrap();

    EscrowAccountPlan::fund_all(&mut plans, h.ledger.as_ref(), &h.setup, &h.retry)
        .await
        .unwrap();

    assert_eq!(
        h.ledger.sequence(&h.setup.account_id()).await.unwrap(),
        before + 1
    );
    for plan in &plans {
        assert_eq!(plan.step(), SetupStep::Funded);
        assert!(h.ledger.balance(&plan.account()).await.is_some());
    }
}

// =========================================================================
// Claims
// =========================================================================

#[tokio::test]
async fn counter_claim_before_deadline_then_sibling_loses() {
    let h = Harness::new().await;
    let (sealed, [x1, _]) = h.sealed().await;

    let hash = submit(
        h.ledger.as_ref(),
        &sealed.counter_tx,
        Some(&x1.to_preimage()),
        &h.retry,
    )
    .await
    .unwrap();
    assert_eq!(sealed.kind_of(&hash), Some(ClaimKind::Counter));
    assert_eq!(
        h.ledger.balance(&h.bob.account_id()).await,
        Some(Decimal::new(10_001, 0))
    );

    h.at(TAU + 5);
    let err = submit_classified(
        h.ledger.as_ref(),
        &sealed.main_tx,
        Some(&x1.to_preimage()),
        &h.retry,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FairswapError::RaceLoss { .. }));
}

#[tokio::test]
async fn main_claim_windows_on_both_sides() {
    let h = Harness::new().await;
    let (sealed, [x1, _]) = h.sealed().await;
    let preimage = x1.to_preimage();

    h.at(TAU - 1);
    let early = submit_classified(h.ledger.as_ref(), &sealed.main_tx, Some(&preimage), &h.retry)
        .await
        .unwrap_err();
    assert!(matches!(early, FairswapError::WindowMiss { closed: false, .. }));

    h.at(TAU + GRACE);
    let late = submit_classified(h.ledger.as_ref(), &sealed.main_tx, Some(&preimage), &h.retry)
        .await
        .unwrap_err();
    assert!(matches!(late, FairswapError::WindowMiss { closed: true, .. }));

    let counter_late =
        submit_classified(h.ledger.as_ref(), &sealed.counter_tx, Some(&preimage), &h.retry)
            .await
            .unwrap_err();
    assert!(matches!(counter_late, FairswapError::WindowMiss { closed: true, .. }));
}

#[tokio::test]
async fn deadline_boundary_belongs_to_main() {
    let h = Harness::new().await;
    let (sealed, [x1, _]) = h.sealed().await;
    let preimage = x1.to_preimage();

    h.at(TAU);
    let counter =
        submit_classified(h.ledger.as_ref(), &sealed.counter_tx, Some(&preimage), &h.retry)
            .await
            .unwrap_err();
    assert!(matches!(counter, FairswapError::WindowMiss { closed: true, .. }));
    submit(h.ledger.as_ref(), &sealed.main_tx, Some(&preimage), &h.retry)
        .await
        .unwrap();

    assert_eq!(
        h.ledger.balance(&h.alice.account_id()).await,
        Some(Decimal::new(10_100, 0))
    );
    assert_eq!(
        h.ledger.balance(&sealed.account).await,
        Some(Decimal::new(250_009, 5))
    );
}

#[tokio::test]
async fn wrong_or_missing_preimage_fails_threshold() {
    let h = Harness::new().await;
    let (sealed, [_, x2]) = h.sealed().await;

    let wrong =
        submit_classified(h.ledger.as_ref(), &sealed.counter_tx, Some(&x2.to_preimage()), &h.retry)
            .await
            .unwrap_err();
    assert!(matches!(wrong, FairswapError::ThresholdFailure { .. }));

    // Reported the same way after the deadline: weight is checked first.
    h.at(TAU + GRACE + 10);
    let missing = submit(h.ledger.as_ref(), &sealed.main_tx, None, &h.retry)
        .await
        .unwrap_err();
    assert_eq!(missing, Rejection::ThresholdNotMet { required: 2, weight: 1 });
}

#[tokio::test]
async fn spent_account_stays_spent() {
    let h = Harness::new().await;
    let (sealed, [x1, _]) = h.sealed().await;
    let preimage = x1.to_preimage();

    h.at(TAU + 10);
    submit(h.ledger.as_ref(), &sealed.main_tx, Some(&preimage), &h.retry)
        .await
        .unwrap();
    for tx in [&sealed.main_tx, &sealed.counter_tx] {
        let err = submit(h.ledger.as_ref(), tx, Some(&preimage), &h.retry)
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::BadSequence { .. }));
    }
}

#[tokio::test]
async fn executed_claim_publishes_the_share() {
    let h = Harness::new().await;
    let (sealed, [x1, _]) = h.sealed().await;
    submit(h.ledger.as_ref(), &sealed.counter_tx, Some(&x1.to_preimage()), &h.retry)
        .await
        .unwrap();

    let signatures = h.ledger.recent_signatures(&sealed.account, 1).await.unwrap();
    let revealed: Vec<Share> = signatures
        .iter()
        .filter_map(|s| match s {
            fairswap_types::DecoratedSignature::HashPreimage(p) => Share::from_preimage(p).ok(),
            fairswap_types::DecoratedSignature::Ed25519 { .. } => None,
        })
        .collect();
    assert_eq!(revealed, vec![x1]);
}

#[tokio::test]
async fn persistent_outage_exhausts_retries() {
    let h = Harness::new().await;
    let (sealed, [x1, _]) = h.sealed().await;
    h.ledger.inject_outages(10).await;
    let err = submit_classified(
        h.ledger.as_ref(),
        &sealed.counter_tx,
        Some(&x1.to_preimage()),
        &h.retry,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FairswapError::TransientLedger { attempts: 3, .. }));

    // Nothing applied: the claim still works once the ledger recovers.
    h.ledger.inject_outages(0).await;
    h.clock.advance(Duration::from_secs(1));
    submit(h.ledger.as_ref(), &sealed.counter_tx, Some(&x1.to_preimage()), &h.retry)
        .await
        .unwrap();
}
