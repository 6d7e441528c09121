//! # fairswap-ledger
//!
//! **Ledger collaborator plane**: the contract the protocol engine expects
//! from an account-based ledger, plus the pieces needed to talk to one
//! safely.
//!
//! ## Architecture
//!
//! 1. **LedgerClient**: submit envelopes, read sequences, histories, and
//!    the ledger's clock
//! 2. **Funder**: faucet-style account bootstrapping (a precondition)
//! 3. **Clock / DeadlineWaiter**: "wait until τ + margin" against the
//!    ledger's clock, mockable with [`ManualClock`]
//! 4. **Retry**: bounded exponential backoff, transient failures only
//! 5. **InMemoryLedger**: reference ledger enforcing sequence exclusion,
//!    time windows, and weighted signer thresholds
//!
//! The engine never enforces mutual exclusion itself: the ledger's
//! per-account sequence check is the only serialization point.

pub mod client;
pub mod clock;
pub mod memory;
pub mod retry;

pub use client::{Funder, LedgerClient, LedgerError, LedgerRecord, Rejection, Transient};
pub use clock::{Clock, DeadlineWaiter, ManualClock, SystemClock};
pub use memory::InMemoryLedger;
pub use retry::{RetryError, query, with_retry};
