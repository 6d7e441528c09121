//! # fairswap-exchange
//!
//! **Exchange plane**: drives a two-party fair exchange from setup to
//! settlement and recovers the secret afterwards.
//!
//! ## Architecture
//!
//! 1. **Exchange**: the setup party's orchestrator. Splits the secret,
//!    seals one escrow account per party, and tracks the exchange state by
//!    reconciling with the ledger
//! 2. **Claimant**: one per party, independent of the orchestrator. Claims
//!    the counter payout with a leaked share or waits for the deadline and
//!    claims its main payout
//! 3. **SecretReconstructor**: reads the revealed preimages back off the
//!    ledger and rebuilds the secret
//!
//! ## Exchange Flow
//!
//! ```text
//! Exchange.setup() → shares to parties → Claimant.run(leaks)
//!     → counter/main claims race on the ledger → Exchange.observe()
//!     → SecretReconstructor.recover()
//! ```
//!
//! Fairness comes from the escrow accounts: any claim that executes carries
//! the bound share as a public preimage, so either both shares end up on
//! the ledger or neither party gains anything.

pub mod orchestrator;
pub mod party;
pub mod reconstructor;

pub use orchestrator::{Exchange, ExchangeDescriptor};
pub use party::{ClaimOutcome, ClaimReport, Claimant};
pub use reconstructor::SecretReconstructor;
