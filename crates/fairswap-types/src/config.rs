//! Configuration for a fair exchange and for ledger-call retries.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{FairswapError, Result, constants};

/// Protocol-tunable constants for one exchange.
///
/// Validated with [`ExchangeConfig::validate`] before anything touches the
/// ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Paid to the owning claimant by the main transaction.
    pub prize: Decimal,
    /// Returned to the setup party by the main transaction. May be zero.
    pub pawn: Decimal,
    /// Paid to the other party by the counter transaction.
    pub counterprize: Decimal,
    /// Starting balance of each escrow account.
    pub funding_amount: Decimal,
    /// Offset from setup time to the deadline τ.
    pub deadline_offset: Duration,
    /// Grace window Δ after τ during which main claims are valid.
    /// `None` leaves the main window open-ended.
    pub grace: Option<Duration>,
    /// Safety margin added to τ before attempting a main claim.
    pub clock_skew_margin: Duration,
    /// Retry policy for transient ledger failures.
    pub retry: RetryPolicy,
}

impl ExchangeConfig {
    /// Testnet demonstration amounts:
    /// prize 100, pawn 100, counterprize 1, funding 202.50009.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            prize: Decimal::new(100, 0),
            pawn: Decimal::new(100, 0),
            counterprize: Decimal::ONE,
            funding_amount: Decimal::new(20_250_009, 5),
            deadline_offset: Duration::from_secs(constants::DEFAULT_DEADLINE_SECS),
            grace: Some(Duration::from_secs(constants::DEFAULT_GRACE_SECS)),
            clock_skew_margin: Duration::from_secs(constants::DEFAULT_CLOCK_SKEW_MARGIN_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Reject invalid parameter combinations.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let reject = |reason: String| Err(FairswapError::InvalidConfig { reason });

        if self.prize <= Decimal::ZERO {
            return reject(format!("prize must be positive, got {}", self.prize));
        }
        if self.pawn < Decimal::ZERO {
            return reject(format!("pawn must not be negative, got {}", self.pawn));
        }
        if self.counterprize <= Decimal::ZERO {
            return reject(format!(
                "counterprize must be positive, got {}",
                self.counterprize
            ));
        }
        if self.deadline_offset.as_secs() == 0 {
            return reject("deadline offset must be at least one second".to_string());
        }
        if let Some(grace) = self.grace {
            if grace.as_secs() == 0 {
                return reject("grace window must be at least one second".to_string());
            }
        }
        let main_payout = self.prize + self.pawn;
        if self.funding_amount < main_payout {
            return reject(format!(
                "funding {} cannot cover prize + pawn {main_payout}",
                self.funding_amount
            ));
        }
        if self.funding_amount < self.counterprize {
            return reject(format!(
                "funding {} cannot cover counterprize {}",
                self.funding_amount, self.counterprize
            ));
        }
        self.retry.validate()
    }

    /// Deadline offset in whole seconds.
    #[must_use]
    pub fn deadline_secs(&self) -> u64 {
        self.deadline_offset.as_secs()
    }

    /// Grace window in whole seconds, if bounded.
    #[must_use]
    pub fn grace_secs(&self) -> Option<u64> {
        self.grace.map(|g| g.as_secs())
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::demo()
    }
}

/// Bounded exponential backoff for transient ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// No waiting between attempts. Useful for tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// # Errors
    /// Returns `InvalidConfig` if no attempt would ever be made.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(FairswapError::InvalidConfig {
                reason: "retry policy needs at least one attempt".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(constants::DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(constants::DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_config_is_valid() {
        let cfg = ExchangeConfig::demo();
        cfg.validate().unwrap();
        assert_eq!(cfg.funding_amount.to_string(), "202.50009");
        assert_eq!(cfg.deadline_secs(), 30);
    }

    #[test]
    fn non_positive_prize_rejected() {
        for prize in [Decimal::ZERO, Decimal::NEGATIVE_ONE] {
            let cfg = ExchangeConfig {
                prize,
                ..ExchangeConfig::demo()
            };
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, FairswapError::InvalidConfig { .. }));
            assert!(err.to_string().contains("prize"));
        }
    }

    #[test]
    fn zero_grace_rejected() {
        let cfg = ExchangeConfig {
            grace: Some(Duration::ZERO),
            ..ExchangeConfig::demo()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn open_ended_grace_allowed() {
        let cfg = ExchangeConfig {
            grace: None,
            ..ExchangeConfig::demo()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.grace_secs(), None);
    }

    #[test]
    fn zero_pawn_allowed_negative_rejected() {
        let mut cfg = ExchangeConfig {
            pawn: Decimal::ZERO,
            ..ExchangeConfig::demo()
        };
        cfg.validate().unwrap();
        cfg.pawn = Decimal::NEGATIVE_ONE;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn underfunded_rejected() {
        let cfg = ExchangeConfig {
            funding_amount: Decimal::new(150, 0),
            ..ExchangeConfig::demo()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("prize + pawn"));
    }

    #[test]
    fn zero_deadline_rejected() {
        let cfg = ExchangeConfig {
            deadline_offset: Duration::from_millis(500),
            ..ExchangeConfig::demo()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(500));
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(RetryPolicy::immediate(0).validate().is_err());
        assert!(RetryPolicy::immediate(1).validate().is_ok());
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = ExchangeConfig::demo();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ExchangeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
