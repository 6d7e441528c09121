//! Secret sharing and share commitments.
//!
//! Shamir's scheme over GF(256) with the AES field polynomial, applied
//! byte by byte: each secret byte is the constant term of a fresh random
//! polynomial of degree `k - 1`, and share `i` holds its value at `x = i`.
//! Any `k` shares interpolate back to the secret; fewer reveal nothing.

use std::collections::BTreeMap;

use fairswap_types::{Commitment, FairswapError, Result, Secret, Share, constants};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

// ============================================================================
// GF(256)
// ============================================================================

fn gf256_mul(a: u8, b: u8) -> u8 {
    let mut result = 0u8;
    let mut a = a;
    let mut b = b;
    while b != 0 {
        if b & 1 != 0 {
            result ^= a;
        }
        let hi_bit = a & 0x80;
        a <<= 1;
        if hi_bit != 0 {
            a ^= 0x1B;
        }
        b >>= 1;
    }
    result
}

/// `a^254 == a^-1` for nonzero `a`.
fn gf256_inv(a: u8) -> u8 {
    let mut result = a;
    for _ in 0..6 {
        result = gf256_mul(result, result);
        result = gf256_mul(result, a);
    }
    gf256_mul(result, result)
}

/// Evaluate `coeffs[0] + coeffs[1]·x + …` at `x` (Horner).
fn eval(coeffs: &[u8], x: u8) -> u8 {
    coeffs
        .iter()
        .rev()
        .fold(0u8, |acc, &c| gf256_mul(acc, x) ^ c)
}

/// Lagrange basis weights at `x = 0` for the given distinct nonzero points.
fn lagrange_at_zero(xs: &[u8]) -> Vec<u8> {
    xs.iter()
        .map(|&xi| {
            let (num, den) = xs.iter().filter(|&&xj| xj != xi).fold(
                (1u8, 1u8),
                |(num, den), &xj| (gf256_mul(num, xj), gf256_mul(den, xj ^ xi)),
            );
            gf256_mul(num, gf256_inv(den))
        })
        .collect()
}

// ============================================================================
// SharingScheme
// ============================================================================

/// A `threshold`-of-`shares` Shamir scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharingScheme {
    shares: u8,
    threshold: u8,
}

impl SharingScheme {
    /// # Errors
    /// `InvalidThreshold` if `threshold > shares`, `shares < 2`, or
    /// `threshold == 0`.
    pub fn new(shares: u8, threshold: u8) -> Result<Self> {
        if shares < 2 || threshold == 0 || threshold > shares {
            return Err(FairswapError::InvalidThreshold { shares, threshold });
        }
        Ok(Self { shares, threshold })
    }

    /// The scheme the exchange uses: two parties, both shares needed.
    #[must_use]
    pub fn two_of_two() -> Self {
        Self {
            shares: constants::SHARE_COUNT,
            threshold: constants::SHARE_THRESHOLD,
        }
    }

    #[must_use]
    pub fn shares(&self) -> u8 {
        self.shares
    }

    #[must_use]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Split with fresh OS randomness.
    #[must_use]
    pub fn split(&self, secret: &Secret) -> Vec<Share> {
        self.split_with_rng(secret, &mut OsRng)
    }

    /// Split with a caller-supplied CSPRNG. Shares are indexed `1..=n`.
    pub fn split_with_rng<R: RngCore + CryptoRng>(&self, secret: &Secret, rng: &mut R) -> Vec<Share> {
        let k = usize::from(self.threshold);
        let mut values = vec![Vec::with_capacity(secret.len()); usize::from(self.shares)];
        let mut coeffs = vec![0u8; k];

        for &byte in secret.as_bytes() {
            coeffs[0] = byte;
            rng.fill_bytes(&mut coeffs[1..]);
            for (x, value) in (1..=self.shares).zip(values.iter_mut()) {
                value.push(eval(&coeffs, x));
            }
        }

        (1..=self.shares)
            .zip(values)
            .map(|(index, value)| Share::new(index, value))
            .collect()
    }

    /// Reconstruct from at least `threshold` distinct shares. Extra shares
    /// are ignored: the `threshold` lowest indices are used.
    ///
    /// # Errors
    /// - `InvalidShare` for index 0 or shares of different lengths
    /// - `AmbiguousShares` if an index appears twice
    /// - `InsufficientShares` if fewer than `threshold` are given
    pub fn reconstruct(&self, shares: &[Share]) -> Result<Secret> {
        let mut by_index = BTreeMap::new();
        for share in shares {
            if share.index == 0 {
                return Err(FairswapError::InvalidShare {
                    reason: "share index 0 is reserved for the secret".to_string(),
                });
            }
            if by_index.insert(share.index, share).is_some() {
                return Err(FairswapError::AmbiguousShares { index: share.index });
            }
        }

        let needed = usize::from(self.threshold);
        if by_index.len() < needed {
            return Err(FairswapError::InsufficientShares {
                needed,
                have: by_index.len(),
            });
        }

        let chosen: Vec<&Share> = by_index.into_values().take(needed).collect();
        let len = chosen[0].value.len();
        if let Some(odd) = chosen.iter().find(|s| s.value.len() != len) {
            return Err(FairswapError::InvalidShare {
                reason: format!(
                    "share {} has {} bytes, expected {len}",
                    odd.index,
                    odd.value.len()
                ),
            });
        }

        let xs: Vec<u8> = chosen.iter().map(|s| s.index).collect();
        let weights = lagrange_at_zero(&xs);
        let secret = (0..len)
            .map(|i| {
                chosen
                    .iter()
                    .zip(&weights)
                    .fold(0u8, |acc, (share, &w)| acc ^ gf256_mul(share.value[i], w))
            })
            .collect::<Vec<u8>>();
        Ok(Secret::new(secret))
    }
}

impl Default for SharingScheme {
    fn default() -> Self {
        Self::two_of_two()
    }
}

/// Commit to a share: SHA-256 of its preimage encoding.
#[must_use]
pub fn commit(share: &Share) -> Commitment {
    Commitment::of(share)
}
