//! Lifecycle types: exchange states, escrow setup steps, claim kinds.
//!
//! ## Exchange State Machine
//!
//! ```text
//!   SETUP ──▶ SEALED ──▶ AWAITING_DEADLINE ──┬──▶ EARLY_CLAIM_OBSERVED ──┬──▶ SETTLED
//!     │                                      │            │              │
//!     ▼                                      │            ▼              │
//!   ABORTED                                  └──────▶ DEADLINE_PASSED ───┼──▶ SETTLED
//!                                                                        └──▶ EXPIRED
//! ```
//!
//! Transitions are **monotonic**. `SETTLED`, `EXPIRED` and `ABORTED` are
//! terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of one fair exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeState {
    /// Escrow accounts are being funded and configured.
    Setup,
    /// Both escrow accounts sealed; shares not yet handed out.
    Sealed,
    /// Shares handed out; before τ with no claim observed.
    AwaitingDeadline,
    /// A counter claim executed before τ.
    EarlyClaimObserved,
    /// τ has passed; main claims are open.
    DeadlinePassed,
    /// Both accounts executed exactly one claim.
    Settled,
    /// τ+Δ passed with an account still unclaimed. Its funds stay frozen.
    Expired,
    /// Setup failed before both accounts were sealed.
    Aborted,
}

impl ExchangeState {
    /// Can the exchange move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Setup, Self::Sealed | Self::Aborted)
                | (Self::Sealed, Self::AwaitingDeadline)
                | (
                    Self::AwaitingDeadline,
                    Self::EarlyClaimObserved | Self::DeadlinePassed
                )
                | (Self::EarlyClaimObserved, Self::DeadlinePassed | Self::Settled)
                | (Self::DeadlinePassed, Self::Settled | Self::Expired)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Expired | Self::Aborted)
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "SETUP"),
            Self::Sealed => write!(f, "SEALED"),
            Self::AwaitingDeadline => write!(f, "AWAITING_DEADLINE"),
            Self::EarlyClaimObserved => write!(f, "EARLY_CLAIM_OBSERVED"),
            Self::DeadlinePassed => write!(f, "DEADLINE_PASSED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Last successfully completed step of an escrow account's setup.
///
/// Reported with setup failures so an operator knows whether the master
/// key is still live (anything before `Sealed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SetupStep {
    /// Nothing submitted yet.
    Planned,
    /// Account created and funded by the setup party.
    Funded,
    /// Current sequence read.
    SequenceRead,
    /// Counter and main transactions built and hashed.
    TransactionsBuilt,
    /// Signers installed and master weight zeroed.
    Sealed,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned => write!(f, "PLANNED"),
            Self::Funded => write!(f, "FUNDED"),
            Self::SequenceRead => write!(f, "SEQUENCE_READ"),
            Self::TransactionsBuilt => write!(f, "TRANSACTIONS_BUILT"),
            Self::Sealed => write!(f, "SEALED"),
        }
    }
}

/// Which half of an escrow account's transaction pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimKind {
    /// Pays the counterprize to the other party; valid `[0, τ)`.
    Counter,
    /// Pays the prize to the owning claimant and the pawn to the setup
    /// party; valid `[τ, τ+Δ)`.
    Main,
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "COUNTER"),
            Self::Main => write!(f, "MAIN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let path = [
            ExchangeState::Setup,
            ExchangeState::Sealed,
            ExchangeState::AwaitingDeadline,
            ExchangeState::DeadlinePassed,
            ExchangeState::Settled,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn early_claim_paths() {
        use ExchangeState::*;
        assert!(AwaitingDeadline.can_transition_to(EarlyClaimObserved));
        assert!(EarlyClaimObserved.can_transition_to(DeadlinePassed));
        assert!(EarlyClaimObserved.can_transition_to(Settled));
        assert!(!EarlyClaimObserved.can_transition_to(Expired));
    }

    #[test]
    fn terminal_states_are_final() {
        use ExchangeState::*;
        let all = [
            Setup,
            Sealed,
            AwaitingDeadline,
            EarlyClaimObserved,
            DeadlinePassed,
            Settled,
            Expired,
            Aborted,
        ];
        for terminal in [Settled, Expired, Aborted] {
            assert!(terminal.is_terminal());
            for target in all {
                assert!(!terminal.can_transition_to(target), "{terminal} -> {target}");
            }
        }
    }

    #[test]
    fn no_backwards_transitions() {
        use ExchangeState::*;
        assert!(!Sealed.can_transition_to(Setup));
        assert!(!DeadlinePassed.can_transition_to(AwaitingDeadline));
        assert!(!DeadlinePassed.can_transition_to(EarlyClaimObserved));
        assert!(!Setup.can_transition_to(Settled));
    }

    #[test]
    fn setup_steps_are_ordered() {
        assert!(SetupStep::Planned < SetupStep::Funded);
        assert!(SetupStep::TransactionsBuilt < SetupStep::Sealed);
        assert_eq!(SetupStep::SequenceRead.to_string(), "SEQUENCE_READ");
    }

    #[test]
    fn state_serde_roundtrip() {
        let s = ExchangeState::EarlyClaimObserved;
        let json = serde_json::to_string(&s).unwrap();
        let back: ExchangeState = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
