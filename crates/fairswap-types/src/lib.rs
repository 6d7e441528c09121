//! # fairswap-types
//!
//! Shared types, errors, and configuration for the **fairswap** protocol
//! engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`TxHash`], [`Digest`], [`ExchangeId`]
//! - **Keys**: [`Keypair`] (ed25519)
//! - **Secret model**: [`Secret`], [`Share`], [`Commitment`]
//! - **Signer model**: [`Signer`], [`Thresholds`], [`AccountSnapshot`]
//! - **Transaction model**: [`Transaction`], [`Operation`], [`TimeWindow`],
//!   [`ConditionalTransaction`], [`TransactionEnvelope`], [`DecoratedSignature`]
//! - **Lifecycle**: [`ExchangeState`], [`SetupStep`], [`ClaimKind`]
//! - **Configuration**: [`ExchangeConfig`], [`RetryPolicy`]
//! - **Errors**: [`FairswapError`] with `FS_ERR_` prefix codes
//! - **Constants**: protocol weights, thresholds, and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod keys;
pub mod secret;
pub mod signer;
pub mod state;
pub mod transaction;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use keys::*;
pub use secret::*;
pub use signer::*;
pub use state::*;
pub use transaction::*;

// Constants are accessed via `fairswap_types::constants::FOO`
// (not re-exported to avoid name collisions).
