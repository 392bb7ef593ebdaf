//! Fixed-size blake3 digests and the reputation commitment chain

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 32-byte blake3 digest, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn hash(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl std::fmt::Display for Digest32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest32({})", &self.to_hex()[..16])
    }
}

impl Serialize for Digest32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Digest32::from_hex(&hex)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid 32-byte hex digest: {hex}")))
    }
}

/// Compact commitment over an agent's accepted validation history.
///
/// The chain only moves forward: each accepted batch produces
/// `root' = blake3(root || batch_digest)` at `epoch + 1`. There is no API
/// that rewinds or overwrites a commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReputationCommitment {
    /// Number of batches folded into the root
    pub epoch: u64,
    /// Current chain head
    pub root: Digest32,
}

impl ReputationCommitment {
    /// The empty commitment before any validation has been accepted.
    pub fn genesis() -> Self {
        Self::default()
    }

    /// Fold one accepted batch into the chain.
    pub fn advance(&self, batch_digest: &Digest32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.root.as_bytes());
        hasher.update(&self.epoch.to_be_bytes());
        hasher.update(batch_digest.as_bytes());
        Self {
            epoch: self.epoch + 1,
            root: Digest32(*hasher.finalize().as_bytes()),
        }
    }

    /// Whether `other` is at or beyond this commitment's position.
    pub fn is_successor_or_equal(&self, other: &ReputationCommitment) -> bool {
        other.epoch >= self.epoch
    }
}
