//! The Agent Trust Record, one per asset

use crate::dispute::DisputeRecord;
use crate::escrow::EscrowLedger;
use crate::fees::FeeAccount;
use crate::validation::ValidationBook;
use bond_types::{
    AgentState, Amount, ArchiveRef, AssetId, BondError, BondResult, ConsensusPolicy, FeeConfig,
    Identity, ProtocolConfig,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reference to archived history, written once per reputation epoch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPointer {
    pub reference: ArchiveRef,
    pub epoch: u64,
    pub anchored_at: DateTime<Utc>,
}

/// Persisted trust state of one asset-bound agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTrustRecord {
    pub asset_id: AssetId,
    /// Administers trust parameters; distinct from `owner`
    pub authority: Identity,
    /// Holder of the underlying asset
    pub owner: Identity,
    pub state: AgentState,
    pub protocol_version: u32,
    pub bond: EscrowLedger,
    pub validation: ValidationBook,
    pub validator_whitelist: Option<BTreeSet<Identity>>,
    pub consensus: ConsensusPolicy,
    pub fee_config: FeeConfig,
    pub fees: FeeAccount,
    pub registration_fee_paid: bool,
    pub dispute: Option<DisputeRecord>,
    pub history_pointer: Option<HistoryPointer>,
    pub last_transfer_timestamp: Option<DateTime<Utc>>,
    /// Externally reported total value managed
    pub tvm: Amount,
    pub unbonding_deadline: Option<DateTime<Utc>>,
    pub migrated_from: Option<AssetId>,
    pub migrated_to: Option<AssetId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of committed commands
    pub revision: u64,
}

impl AgentTrustRecord {
    /// A fresh, unfunded record under the protocol's current defaults.
    pub fn new(
        asset_id: AssetId,
        authority: Identity,
        owner: Identity,
        config: &ProtocolConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bond: EscrowLedger::new(&asset_id, config.denomination.clone()),
            asset_id,
            authority,
            owner,
            state: AgentState::Uninitialized,
            protocol_version: config.protocol_version,
            validation: ValidationBook::default(),
            validator_whitelist: None,
            consensus: config.default_consensus.clone(),
            fee_config: config.default_fees.clone(),
            fees: FeeAccount::default(),
            registration_fee_paid: false,
            dispute: None,
            history_pointer: None,
            last_transfer_timestamp: None,
            tvm: Amount::zero(),
            unbonding_deadline: None,
            migrated_from: None,
            migrated_to: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn bond_amount(&self) -> Amount {
        self.bond.amount()
    }

    pub fn score(&self) -> u8 {
        self.validation.score
    }

    pub fn has_open_dispute(&self) -> bool {
        self.dispute.as_ref().is_some_and(|d| d.is_open())
    }

    pub fn is_whitelisted(&self, validator: &Identity) -> bool {
        self.validator_whitelist
            .as_ref()
            .map(|set| set.contains(validator))
            .unwrap_or(true)
    }

    /// Fails while an unbonding deadline is still ahead of `now`.
    pub fn ensure_grace_elapsed(&self, now: DateTime<Utc>) -> BondResult<()> {
        match self.unbonding_deadline {
            Some(deadline) if now < deadline => {
                let remaining_ms = (deadline - now).num_milliseconds();
                Err(BondError::GracePeriodNotElapsed {
                    remaining_secs: (remaining_ms + 999) / 1000,
                })
            }
            _ => Ok(()),
        }
    }
}
