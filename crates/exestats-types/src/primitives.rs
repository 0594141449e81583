//! Opaque value types used as record fields.

use fixed_hash::construct_fixed_hash;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

construct_fixed_hash! {
    /// 20-byte account address.
    pub struct Address(20);
}

construct_fixed_hash! {
    /// 32-byte transaction hash.
    pub struct Hash(32);
}

construct_fixed_hash! {
    /// 64-byte validator node identity (uncompressed public key).
    pub struct NodeId(64);
}

/// Address a validator node is registered under.
pub type NodeAddress = Address;

mod serde_impls {
    use super::{Address, Hash, NodeId};
    use impl_serde::impl_fixed_hash_serde;

    impl_fixed_hash_serde!(Address, 20);
    impl_fixed_hash_serde!(Hash, 32);
    impl_fixed_hash_serde!(NodeId, 64);
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid amount {0:?}: expected an unsigned decimal integer")]
    InvalidAmount(String),
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {found}")]
    InvalidLength { expected: usize, found: usize },
}

/// Parses a `0x`-prefixed (or bare) hex string into a fixed-width value.
pub fn parse_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
    if bytes.len() != N {
        return Err(ParseError::InvalidLength { expected: N, found: bytes.len() });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

impl Address {
    /// Full `0x`-prefixed lowercase hex, unlike the abbreviated `Display`.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    pub fn parse_hex(s: &str) -> Result<Self, ParseError> {
        parse_fixed::<20>(s).map(Address)
    }
}

impl Hash {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    pub fn parse_hex(s: &str) -> Result<Self, ParseError> {
        parse_fixed::<32>(s).map(Hash)
    }
}

impl NodeId {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    pub fn parse_hex(s: &str) -> Result<Self, ParseError> {
        parse_fixed::<64>(s).map(NodeId)
    }
}

/// Token amount in the chain's smallest unit.
///
/// Serialized as a decimal string: amounts routinely exceed 2^53 and must
/// survive JSON consumers that read numbers as doubles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(value: u128) -> Self {
        Amount(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(value as u128)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Amount(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>()
            .map(Amount)
            .map_err(|_| ParseError::InvalidAmount(s.to_string()))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal amount string or an unsigned integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            // Older producers emitted plain JSON numbers.
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount::from(v))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
