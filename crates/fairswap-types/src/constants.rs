//! System-wide constants for the fairswap protocol engine.

/// Number of shares the secret is split into (one per escrow account).
pub const SHARE_COUNT: u8 = 2;

/// Number of shares required to reconstruct the secret.
pub const SHARE_THRESHOLD: u8 = 2;

/// Master weight set while the escrow account is being configured.
pub const SETUP_MASTER_WEIGHT: u8 = 255;

/// Master weight after sealing. Nothing signed by the master key counts.
pub const SEALED_MASTER_WEIGHT: u8 = 0;

/// Low threshold of a sealed escrow account.
pub const SEALED_LOW_THRESHOLD: u8 = 1;

/// Medium threshold of a sealed escrow account (payments).
pub const SEALED_MEDIUM_THRESHOLD: u8 = 2;

/// High threshold of a sealed escrow account (signer changes).
/// Unreachable by the installed signers, so the signer set is frozen.
pub const SEALED_HIGH_THRESHOLD: u8 = 254;

/// Weight of each pre-authorized transaction signer.
pub const PRE_AUTH_SIGNER_WEIGHT: u8 = 1;

/// Weight of the hash-preimage signer bound to the account's share.
pub const HASH_PREIMAGE_SIGNER_WEIGHT: u8 = 1;

// A claim needs both the pre-authorization and the preimage.
const _: () = assert!(
    PRE_AUTH_SIGNER_WEIGHT as u16 + HASH_PREIMAGE_SIGNER_WEIGHT as u16
        == SEALED_MEDIUM_THRESHOLD as u16
);
const _: () = assert!(SEALED_LOW_THRESHOLD < SEALED_MEDIUM_THRESHOLD);
const _: () = assert!(SEALED_MEDIUM_THRESHOLD <= SEALED_HIGH_THRESHOLD);

/// Default offset from setup time to the deadline τ, in seconds.
pub const DEFAULT_DEADLINE_SECS: u64 = 30;

/// Default grace window Δ after the deadline, in seconds.
pub const DEFAULT_GRACE_SECS: u64 = 3600;

/// Default safety margin added to τ before a main claim is attempted.
pub const DEFAULT_CLOCK_SKEW_MARGIN_SECS: u64 = 5;

/// Default number of attempts for a ledger call (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default initial retry backoff in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;

/// Default maximum retry backoff in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

/// How many times a main claim is re-attempted when the ledger still
/// reports the window as not yet open.
pub const MAIN_CLAIM_EARLY_RETRIES: u32 = 3;

/// Amount credited by the in-memory ledger's faucet.
pub const FAUCET_AMOUNT: i64 = 10_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "fairswap";
