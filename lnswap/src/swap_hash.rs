use crate::preimage::Preimage;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{self, Debug},
    str::FromStr,
};

/// The SHA-256 digest shared by both legs of an atomic swap.
///
/// On the public surface of this crate a swap hash travels as Base64, the
/// payment node identifies invoices and payments by the hex encoding. Both
/// encodings decode to the same 32 bytes, which is what equality is based on.
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct SwapHash([u8; Self::LENGTH]);

impl SwapHash {
    pub const LENGTH: usize = 32;

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
        Ok(SwapHash(data))
    }

    pub fn from_base64(s: &str) -> Result<Self, FromErr> {
        let bytes = base64::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }

    /// URL-safe Base64, used where the hash is part of a request path.
    pub fn to_base64_url(&self) -> String {
        base64::encode_config(&self.0, base64::URL_SAFE)
    }
}

impl Debug for SwapHash {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "SwapHash({:x})", self)
    }
}

impl From<Preimage> for SwapHash {
    fn from(preimage: Preimage) -> Self {
        preimage.hash()
    }
}

impl From<[u8; Self::LENGTH]> for SwapHash {
    fn from(hash: [u8; Self::LENGTH]) -> Self {
        SwapHash(hash)
    }
}

impl fmt::Display for SwapHash {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.to_base64())
    }
}

impl fmt::LowerHex for SwapHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(hex::encode(&self.0).as_str())
    }
}

impl Serialize for SwapHash {
    fn serialize<S>(&self, serializer: S) -> Result<<S as Serializer>::Ok, <S as Serializer>::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for SwapHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, <D as Deserializer<'de>>::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> de::Visitor<'vde> for Visitor {
            type Value = SwapHash;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a base64 encoded 32 byte value")
            }

            fn visit_str<E>(self, v: &str) -> Result<SwapHash, E>
            where
                E: de::Error,
            {
                SwapHash::from_base64(v).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(v), &"base64 encoded bytes")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FromErr {
    #[error("expected {expected} bytes but got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid hex")]
    FromHex(#[from] hex::FromHexError),
    #[error("invalid base64")]
    FromBase64(#[from] base64::DecodeError),
}

/// Parses the hex encoding, which is how the payment node reports hashes.
impl FromStr for SwapHash {
    type Err = FromErr;

    fn from_str(s: &str) -> Result<Self, <Self as FromStr>::Err> {
        let vec = hex::decode(s)?;
        Self::from_slice(&vec)
    }
}
