use crate::swap_hash::{FromErr, SwapHash};
use bitcoin_hashes::{sha256, Hash};
use std::{fmt, str::FromStr};

/// The secret whose SHA-256 digest is the swap hash.
///
/// Revealing a preimage settles every HTLC locked to its hash, so it is never
/// persisted by this crate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Preimage([u8; Self::LENGTH]);

impl Preimage {
    pub const LENGTH: usize = 32;

    pub fn hash(&self) -> SwapHash {
        let digest = sha256::Hash::hash(&self.0);

        SwapHash::from(digest.to_byte_array())
    }

    /// True if this preimage unlocks HTLCs locked to `swap_hash`.
    pub fn matches(&self, swap_hash: &SwapHash) -> bool {
        &self.hash() == swap_hash
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FromErr> {
        if bytes.len() != Self::LENGTH {
            return Err(FromErr::InvalidLength {
                expected: Self::LENGTH,
                got: bytes.len(),
            });
        }
        let mut data = [0; Self::LENGTH];
        data.copy_from_slice(bytes);
        Ok(Preimage(data))
    }

    pub fn from_base64(s: &str) -> Result<Self, FromErr> {
        let bytes = base64::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }
}

impl From<[u8; Self::LENGTH]> for Preimage {
    fn from(preimage: [u8; Self::LENGTH]) -> Self {
        Preimage(preimage)
    }
}

impl fmt::Debug for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Preimage({:x})", self)
    }
}

impl fmt::LowerHex for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(hex::encode(&self.0).as_str())
    }
}

impl FromStr for Preimage {
    type Err = FromErr;

    fn from_str(s: &str) -> Result<Self, <Self as FromStr>::Err> {
        let vec = hex::decode(s)?;
        Self::from_slice(&vec)
    }
}
