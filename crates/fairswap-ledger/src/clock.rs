//! Time sources and the deadline wait.
//!
//! Claim windows are judged by the ledger's clock, so "wait until τ" means
//! reading the ledger's time and sleeping on the local [`Clock`] until the
//! ledger should have passed `τ + margin`, then re-checking.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fairswap_types::{FairswapError, Result, RetryPolicy, unix_secs};

use crate::client::LedgerClient;
use crate::retry::query;

/// A local time source that can sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Return once `now() >= deadline`.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Wall-clock time backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if let Ok(remaining) = (deadline - Utc::now()).to_std() {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// A clock that only moves when told to. Sleeping jumps straight to the
/// deadline, so deadline waits in tests are instant.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Start at whole Unix second `secs`.
    #[must_use]
    pub fn at_unix(secs: i64) -> Self {
        Self {
            millis: AtomicI64::new(secs.saturating_mul(1000)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        self.millis
            .fetch_max(deadline.timestamp_millis(), Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// DeadlineWaiter
// ---------------------------------------------------------------------------

/// Waits until the ledger's clock has passed a target plus a skew margin.
#[derive(Clone)]
pub struct DeadlineWaiter {
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    margin: Duration,
    retry: RetryPolicy,
}

impl DeadlineWaiter {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        margin: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            clock,
            margin,
            retry,
        }
    }

    /// Block until the ledger reports a time at or past
    /// `target_unix + margin`. Returns the ledger time observed.
    ///
    /// # Errors
    /// - `TransientLedger` if the ledger clock cannot be read
    /// - `ExchangeStalled` if the ledger clock stops advancing
    pub async fn wait_until(&self, target_unix: u64) -> Result<DateTime<Utc>> {
        let target = target_unix.saturating_add(self.margin.as_secs());
        let mut last_seen = None;
        let mut stalls = 0u32;

        loop {
            let ledger_now = query(&self.retry, "now", || self.ledger.now()).await?;
            let now = unix_secs(ledger_now);
            if now >= target {
                return Ok(ledger_now);
            }

            if last_seen.is_some_and(|prev| now <= prev) {
                stalls += 1;
                if stalls >= self.retry.max_attempts {
                    return Err(FairswapError::ExchangeStalled {
                        reason: format!("ledger clock stuck at {now}, waiting for {target}"),
                    });
                }
            }
            last_seen = Some(now);

            let remaining = target - now;
            // Out-of-range waits sleep until the end of representable time.
            let wake = i64::try_from(remaining)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|d| self.clock.now().checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            tracing::debug!(ledger_now = now, target, remaining, "Waiting for deadline");
            self.clock.sleep_until(wake).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryLedger;

    #[tokio::test]
    async fn manual_clock_sleep_jumps_forward() {
        let clock = ManualClock::at_unix(1_000);
        clock
            .sleep_until(DateTime::from_timestamp(1_500, 0).unwrap())
            .await;
        assert_eq!(clock.now().timestamp(), 1_500);

        // Sleeping into the past never rewinds.
        clock
            .sleep_until(DateTime::from_timestamp(10, 0).unwrap())
            .await;
        assert_eq!(clock.now().timestamp(), 1_500);
    }

    #[test]
    fn manual_clock_advance_and_set() {
        let clock = ManualClock::at_unix(0);
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now().timestamp(), 90);
        clock.set(DateTime::from_timestamp(7, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 7);
    }

    #[tokio::test]
    async fn waiter_passes_target_plus_margin() {
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
        let waiter = DeadlineWaiter::new(
            ledger,
            clock.clone(),
            Duration::from_secs(5),
            RetryPolicy::immediate(3),
        );

        let seen = waiter.wait_until(1_030).await.unwrap();
        assert!(seen.timestamp() >= 1_035);
        assert_eq!(clock.now().timestamp(), 1_035);
    }

    #[tokio::test]
    async fn waiter_returns_at_once_when_already_past() {
        let clock = Arc::new(ManualClock::at_unix(2_000));
        let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
        let waiter =
            DeadlineWaiter::new(ledger, clock.clone(), Duration::ZERO, RetryPolicy::immediate(1));
        let seen = waiter.wait_until(1_000).await.unwrap();
        assert_eq!(seen.timestamp(), 2_000);
    }

    #[tokio::test]
    async fn unreachable_target_stalls_instead_of_overflowing() {
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
        let waiter = DeadlineWaiter::new(
            ledger,
            clock.clone(),
            Duration::from_secs(u64::MAX),
            RetryPolicy::immediate(2),
        );
        let err = waiter.wait_until(u64::MAX - 1).await.unwrap_err();
        assert!(matches!(err, FairswapError::ExchangeStalled { .. }));
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test]
    async fn waiter_detects_stuck_ledger_clock() {
        // The ledger's clock is independent of the local one and never moves.
        let ledger_clock = Arc::new(ManualClock::at_unix(100));
        let local_clock = Arc::new(ManualClock::at_unix(100));
        let ledger = Arc::new(InMemoryLedger::new(ledger_clock));
        let waiter =
            DeadlineWaiter::new(ledger, local_clock, Duration::ZERO, RetryPolicy::immediate(2));
        let err = waiter.wait_until(200).await.unwrap_err();
        assert!(matches!(err, FairswapError::ExchangeStalled { .. }));
    }
}
