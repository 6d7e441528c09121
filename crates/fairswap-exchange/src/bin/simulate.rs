//! Fair exchange simulation.
//!
//! Replays a complete exchange on the in-memory ledger with the system
//! clock: three faucet-funded parties, a sealed setup, a leaked share, a
//! counter claim, the deadline, a main claim, a lost race, and the secret
//! recovered from the ledger.
//!
//! Usage: `fairswap-simulate [config.json]` (defaults to the demo terms).

use std::sync::Arc;

use fairswap_escrow::submit_classified;
use fairswap_exchange::{Claimant, Exchange, SecretReconstructor};
use fairswap_ledger::{Clock, Funder, InMemoryLedger, LedgerClient, SystemClock};
use fairswap_types::{
    ExchangeConfig, ExchangeState, FairswapError, Keypair, Operation, Result, Secret, TimeWindow,
    Transaction, constants,
};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SECRET: &[u8] = b"Hello, World!";

fn load_config() -> Result<ExchangeConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ExchangeConfig::demo());
    };
    info!(path = %path, "Loading exchange config");
    let raw = std::fs::read_to_string(&path)?;
    let config: ExchangeConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

fn unexpected(step: &str) -> FairswapError {
    FairswapError::Internal(format!("simulation step did not behave as expected: {step}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        engine = constants::ENGINE_NAME,
        version = constants::VERSION,
        "Starting fair exchange simulation"
    );
    let config = load_config()?;
    let retry = config.retry.clone();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let memory = Arc::new(InMemoryLedger::new(Arc::clone(&clock)));
    let ledger: Arc<dyn LedgerClient> = memory.clone();

    // Faucet-fund the three parties
    let [carol, alice, bob] = [Keypair::random(), Keypair::random(), Keypair::random()];
    for (name, kp) in [("carol", &carol), ("alice", &alice), ("bob", &bob)] {
        memory
            .fund(&kp.account_id())
            .await
            .map_err(|e| FairswapError::LedgerRejected {
                reason: format!("faucet: {e}"),
            })?;
        info!(party = name, account = %kp.account_id(), "Party funded");
    }

    // Carol seals both escrow accounts
    let mut exchange = Exchange::new(config, Arc::clone(&ledger))?;
    let [x1, x2] = exchange
        .setup(
            &carol,
            [alice.account_id(), bob.account_id()],
            &Secret::new(SECRET.to_vec()),
        )
        .await?;
    let descriptor = exchange
        .descriptor()
        .ok_or_else(|| unexpected("setup produced no descriptor"))?;

    // Carol cannot take funds back out of a sealed account
    let alice_escrow = &descriptor.escrows[0];
    let mut drain = Transaction {
        source: alice_escrow.account,
        sequence: alice_escrow.claim_sequence(),
        operations: vec![Operation::Payment {
            destination: carol.account_id(),
            amount: Decimal::new(1_000, 0),
        }],
        time_window: TimeWindow::unbounded(),
    }
    .into_envelope();
    drain.sign(&carol);
    match ledger.submit(&drain).await {
        Err(rejection) => info!(%rejection, "Setup party cannot drain a sealed account"),
        Ok(_) => return Err(unexpected("setup party drained a sealed account")),
    }

    let alice_claimant = Claimant::new(
        alice.account_id(),
        x1.clone(),
        Arc::clone(&descriptor),
        Arc::clone(&ledger),
        Arc::clone(&clock),
    )?;
    let bob_claimant = Claimant::new(
        bob.account_id(),
        x2,
        Arc::clone(&descriptor),
        Arc::clone(&ledger),
        Arc::clone(&clock),
    )?;

    // Alice tries her main claim before the deadline
    match submit_classified(
        ledger.as_ref(),
        &alice_claimant.own_escrow().main_tx,
        Some(&x1.to_preimage()),
        &retry,
    )
    .await
    {
        Err(FairswapError::WindowMiss { closed: false, .. }) => {
            info!(deadline = descriptor.deadline.at, "Early main claim missed its window");
        }
        Err(e) => return Err(e),
        Ok(_) => return Err(unexpected("main claim executed before the deadline")),
    }

    // Bob leaks his share; Alice takes the counterprize from Bob's account
    let leaked = bob_claimant.leak();
    let report = alice_claimant.claim_counter(&leaked).await?;
    exchange.apply_report(&report)?;

    // Both wait for the deadline and claim their main payouts
    info!(deadline = descriptor.deadline.at, "Waiting for the deadline");
    let (alice_main, bob_main) = tokio::join!(alice_claimant.claim_main(), bob_claimant.claim_main());
    let alice_main = alice_main?;
    let bob_main = bob_main?;
    if !alice_main.is_accepted() || bob_main.is_accepted() {
        return Err(unexpected("main claims"));
    }
    warn!(party = %bob.account_id(), "Bob leaked his share and lost his main claim");
    exchange.apply_report(&alice_main)?;
    exchange.apply_report(&bob_main)?;

    let state = exchange.observe().await?;
    if state != ExchangeState::Settled {
        return Err(unexpected("exchange did not settle"));
    }

    // The secret is public
    let secret = SecretReconstructor::new(Arc::clone(&ledger), retry)
        .recover_verified(&descriptor, &descriptor.secret_digest)
        .await?;
    info!(
        secret = %String::from_utf8_lossy(secret.as_bytes()),
        "Secret reconstructed from the ledger"
    );

    for (name, kp) in [("carol", &carol), ("alice", &alice), ("bob", &bob)] {
        if let Some(balance) = memory.balance(&kp.account_id()).await {
            info!(party = name, %balance, "Final balance");
        }
    }
    Ok(())
}
