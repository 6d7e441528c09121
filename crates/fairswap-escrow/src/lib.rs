//! # fairswap-escrow
//!
//! **Escrow plane**: everything that turns a secret and two parties into a
//! sealed, self-enforcing escrow account.
//!
//! ## Architecture
//!
//! 1. **SharingScheme**: k-of-n Shamir split over GF(256) and SHA-256
//!    commitments to each share's preimage encoding
//! 2. **EscrowAccountPlan**: fund, read sequence, build the counter/main
//!    transaction pair, seal the account in one transaction
//! 3. **submit / classify**: send a conditional transaction with its
//!    preimage and map ledger rejections onto the error taxonomy
//!
//! ## Escrow Flow
//!
//! ```text
//! split(secret) → commit(share) → plan.fund() → plan.seal() → SealedEscrow
//!     → submit(counterTx | mainTx, preimage) → exactly one executes
//! ```
//!
//! Once sealed, the account's master key carries no weight: the only way
//! to move its funds is one of the two pre-authorized transactions, and
//! either one publishes the bound share.

pub mod plan;
pub mod sharing;
pub mod submit;

pub use plan::{Deadline, EscrowAccountPlan, EscrowTerms, PlanParties, SealedEscrow};
pub use sharing::{SharingScheme, commit};
pub use submit::{classify, submit, submit_classified};
