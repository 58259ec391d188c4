use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::BrainsError;

/// Token amount in base units (1 BRAINS = 10^18). u128 covers the full
/// supply plus every mint the schedule allows.
pub type Amount = u128;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Identifier of a position inside one registry. Ids are never reused.
pub type PositionId = u64;

/// Sequence number of committed calls. Height 0 is the deployed state.
pub type Height = u64;

// ── Address ──────────────────────────────────────────────────────────────────

/// 32-byte account identifier.
///
/// Serialises as a base-58 string so addresses can key JSON maps in
/// deployment files and snapshots alike.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The null address. Never a valid recipient.
    pub const NULL: Address = Address([0u8; 32]);

    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Deterministic address for a human-readable label:
    /// BLAKE3("brains-address:" || label). Used for well-known system
    /// accounts and by operators naming test accounts.
    pub fn from_label(label: &str) -> Self {
        let mut input = b"brains-address:".to_vec();
        input.extend_from_slice(label.as_bytes());
        Self(*blake3::hash(&input).as_bytes())
    }

    /// Base-58 encoded string representation.
    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, BrainsError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| BrainsError::InvalidAddress(format!("{s}: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            BrainsError::InvalidAddress(format!("{s}: expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = BrainsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_b58(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b58 = self.to_b58();
        write!(f, "Address({})", &b58[..b58.len().min(8)])
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_b58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_b58(&s).map_err(serde::de::Error::custom)
    }
}
