//! Protocol, fee, and consensus configuration

use crate::{Amount, BondError, Denomination, Identity, SlashRemainder, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

/// Default unbonding grace period: 7 days.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

/// Default M-of-N agreement window: 1 hour.
pub const DEFAULT_CONSENSUS_WINDOW_SECS: u64 = 60 * 60;

/// Fee schedule applied to an agent; governance-updatable only
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Fixed fee collected once at activation
    pub registration_fee: Amount,
    /// Tax on the task value of each committed validation claim
    pub validation_tax_bps: u32,
    /// Protocol share of seized bonds
    pub vigorish_bps: u32,
    /// Destination of the seized remainder
    pub slash_remainder: SlashRemainder,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            registration_fee: Amount::new(10),
            validation_tax_bps: 50, // 0.5%
            vigorish_bps: 1_000,    // 10%
            slash_remainder: SlashRemainder::Burn,
        }
    }
}

impl FeeConfig {
    pub fn validate(&self) -> Result<(), BondError> {
        if self.validation_tax_bps > BPS_DENOMINATOR {
            return Err(BondError::InvalidConfig(format!(
                "validation_tax_bps {} exceeds {}",
                self.validation_tax_bps, BPS_DENOMINATOR
            )));
        }
        if self.vigorish_bps > BPS_DENOMINATOR {
            return Err(BondError::InvalidConfig(format!(
                "vigorish_bps {} exceeds {}",
                self.vigorish_bps, BPS_DENOMINATOR
            )));
        }
        Ok(())
    }
}

/// M-of-N agreement policy for attestations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusPolicy {
    /// Distinct qualifying validators that must agree (M)
    pub required: u32,
    /// Seconds, measured from a claim's first receipt, within which M must agree
    pub window_secs: u64,
}

impl ConsensusPolicy {
    /// Single attestation commits immediately.
    pub fn single() -> Self {
        Self {
            required: 1,
            window_secs: DEFAULT_CONSENSUS_WINDOW_SECS,
        }
    }

    pub fn m_of_n(required: u32, window_secs: u64) -> Self {
        Self {
            required,
            window_secs,
        }
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs.min(i64::MAX as u64) as i64)
    }

    pub fn validate(&self) -> Result<(), BondError> {
        if self.required == 0 {
            return Err(BondError::InvalidConfig(
                "consensus requires at least one validator".into(),
            ));
        }
        if self.window_secs == 0 {
            return Err(BondError::InvalidConfig(
                "consensus window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self::single()
    }
}

/// Protocol-wide parameters shared by every agent record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Protocol version new records are created under
    pub protocol_version: u32,
    /// Bond required before an agent may become active
    pub required_bond: Amount,
    /// Denomination bonds are held in
    pub denomination: Denomination,
    /// Seconds between an unbond request and fund return
    pub grace_period_secs: u64,
    /// Minimum `bond / tvm`, in basis points
    pub min_collateral_ratio_bps: u32,
    /// Minimum stake a validator must hold for its receipts to count
    pub min_validator_stake: Amount,
    /// Governance identity: resolves disputes, sets fees, reports TVM
    pub governance: Identity,
    /// Treasury all protocol fees are routed to
    pub treasury: Identity,
    /// Fee schedule given to new records
    pub default_fees: FeeConfig,
    /// Consensus policy given to new records
    pub default_consensus: ConsensusPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            required_bond: Amount::new(1_000),
            denomination: Denomination::default(),
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            min_collateral_ratio_bps: 1_000, // 10%
            min_validator_stake: Amount::new(100),
            governance: Identity::new("governance"),
            treasury: Identity::new("treasury"),
            default_fees: FeeConfig::default(),
            default_consensus: ConsensusPolicy::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_period_secs.min(i64::MAX as u64) as i64)
    }

    pub fn validate(&self) -> Result<(), BondError> {
        if self.protocol_version == 0 {
            return Err(BondError::InvalidConfig(
                "protocol_version must be at least 1".into(),
            ));
        }
        if self.required_bond.is_zero() {
            return Err(BondError::InvalidConfig(
                "required_bond must be non-zero".into(),
            ));
        }
        if self.min_collateral_ratio_bps > BPS_DENOMINATOR {
            return Err(BondError::InvalidConfig(format!(
                "min_collateral_ratio_bps {} exceeds {}",
                self.min_collateral_ratio_bps, BPS_DENOMINATOR
            )));
        }
        self.default_fees.validate()?;
        self.default_consensus.validate()?;
        Ok(())
    }
}
