//! Secret, share, and commitment value types.
//!
//! A [`Share`] is hash-locked into an escrow account through its
//! [`Commitment`]. Claiming from that account means presenting the share's
//! preimage encoding (`index ‖ value`) as a signature, which publishes it.

use serde::{Deserialize, Serialize};

use crate::{Digest, FairswapError, Result};

/// The exchanged secret. Known only to the setup party until settlement.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(Vec<u8>);

impl Secret {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whole-secret commitment, for publishing out-of-band.
    #[must_use]
    pub fn digest(&self) -> Digest {
        Digest::of(&self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({} bytes)", self.0.len())
    }
}

/// One share of a threshold-split secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Evaluation point of the sharing polynomial. Never zero.
    pub index: u8,
    /// Share bytes, same length as the secret.
    pub value: Vec<u8>,
}

impl Share {
    #[must_use]
    pub fn new(index: u8, value: Vec<u8>) -> Self {
        Self { index, value }
    }

    /// Canonical preimage encoding: `index ‖ value`.
    #[must_use]
    pub fn to_preimage(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.value.len());
        out.push(self.index);
        out.extend_from_slice(&self.value);
        out
    }

    /// Decode a share from a revealed preimage.
    ///
    /// # Errors
    /// Returns `InvalidShare` for an empty preimage or a zero index.
    pub fn from_preimage(preimage: &[u8]) -> Result<Self> {
        let (&index, value) = preimage
            .split_first()
            .ok_or_else(|| FairswapError::InvalidShare {
                reason: "empty preimage".to_string(),
            })?;
        if index == 0 {
            return Err(FairswapError::InvalidShare {
                reason: "share index 0 is reserved for the secret".to_string(),
            });
        }
        Ok(Self::new(index, value.to_vec()))
    }

    /// Hex rendering `index:value` for out-of-band hand-off.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("{}:{}", self.index, hex::encode(&self.value))
    }

    /// Parse the `index:value` hex rendering.
    ///
    /// # Errors
    /// Returns `InvalidShare` on a malformed string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let (index, value) = s.split_once(':').ok_or_else(|| FairswapError::InvalidShare {
            reason: "expected format index:hex".to_string(),
        })?;
        let index: u8 = index.parse().map_err(|_| FairswapError::InvalidShare {
            reason: format!("bad index {index:?}"),
        })?;
        let value = hex::decode(value).map_err(|e| FairswapError::InvalidShare {
            reason: e.to_string(),
        })?;
        Self::from_preimage(&[&[index][..], &value].concat())
    }
}

/// One-way binding of an account's signer set to a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment {
    /// Index of the committed share.
    pub share_index: u8,
    /// SHA-256 of the share's preimage encoding.
    pub digest: Digest,
}

impl Commitment {
    /// Commit to a share.
    #[must_use]
    pub fn of(share: &Share) -> Self {
        Self {
            share_index: share.index,
            digest: Digest::of(&share.to_preimage()),
        }
    }

    /// Whether `share` opens this commitment.
    #[must_use]
    pub fn opens(&self, share: &Share) -> bool {
        share.index == self.share_index && self.digest.matches(&share.to_preimage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preimage_roundtrip() {
        let share = Share::new(2, vec![1, 2, 3]);
        let back = Share::from_preimage(&share.to_preimage()).unwrap();
        assert_eq!(share, back);
    }

    #[test]
    fn empty_preimage_rejected() {
        let err = Share::from_preimage(&[]).unwrap_err();
        assert!(matches!(err, FairswapError::InvalidShare { .. }));
    }

    #[test]
    fn zero_index_rejected() {
        let err = Share::from_preimage(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, FairswapError::InvalidShare { .. }));
    }

    #[test]
    fn hex_roundtrip() {
        let share = Share::new(1, vec![0xde, 0xad]);
        assert_eq!(share.to_hex(), "1:dead");
        assert_eq!(Share::from_hex("1:dead").unwrap(), share);
        assert!(Share::from_hex("nonsense").is_err());
        assert!(Share::from_hex("x:dead").is_err());
    }

    #[test]
    fn commitment_opens_only_its_share() {
        let a = Share::new(1, b"alpha".to_vec());
        let b = Share::new(2, b"alpha".to_vec());
        let c = Commitment::of(&a);
        assert!(c.opens(&a));
        assert!(!c.opens(&b));
        assert_eq!(c.share_index, 1);
    }

    #[test]
    fn secret_debug_hides_content() {
        let s = Secret::new(b"Hello, World!".to_vec());
        assert_eq!(format!("{s:?}"), "Secret(13 bytes)");
    }
}
