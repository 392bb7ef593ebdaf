//! Monetary amounts and basis-point arithmetic
//!
//! Amounts are unsigned minor units, so a balance can never go negative.
//! Every subtraction on a balance saturates at zero.

use serde::{Deserialize, Serialize};

/// One hundred percent, in basis points.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Financial amount in minor units of the bond denomination
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Amount(pub u64);

impl Amount {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `floor(self * bps / 10_000)`, computed without overflow.
    pub fn apply_bps(self, bps: u32) -> Self {
        let scaled = (self.0 as u128) * (bps as u128) / (BPS_DENOMINATOR as u128);
        Self(scaled.min(u64::MAX as u128) as u64)
    }

    /// `ceil(self * bps / 10_000)`, used for minimum-balance floors.
    pub fn apply_bps_ceil(self, bps: u32) -> Self {
        let numerator = (self.0 as u128) * (bps as u128);
        let denominator = BPS_DENOMINATOR as u128;
        let scaled = numerator.div_ceil(denominator);
        Self(scaled.min(u64::MAX as u128) as u64)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Denomination of a bond (e.g. "USDC", "ETH")
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Denomination(pub String);

impl Denomination {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

impl Default for Denomination {
    fn default() -> Self {
        Self("USDC".into())
    }
}

impl std::fmt::Display for Denomination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
