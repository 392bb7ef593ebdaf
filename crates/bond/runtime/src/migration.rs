//! Migration manager: protocol-version migration and sovereign exit
//!
//! Both paths are explicit authority actions and both are one-way. A
//! migrated record becomes `Migrated`; an exited record becomes `Dead`.

use crate::escrow::EscrowLedger;
use crate::record::AgentTrustRecord;
use bond_types::{
    AgentState, Amount, AssetId, BondError, BondResult, CommandKind, Denomination, Digest32,
    Identity, ReputationCommitment,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Bond value and reputation carried out of the system by a sovereign exit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableIdentity {
    pub asset_id: AssetId,
    pub authority: Identity,
    pub bond: Amount,
    pub denomination: Denomination,
    pub commitment: ReputationCommitment,
    pub score: u8,
    pub protocol_version: u32,
    pub exited_at: DateTime<Utc>,
    /// blake3 over every other field
    pub digest: Digest32,
}

impl PortableIdentity {
    fn content_digest(&self) -> Digest32 {
        let material = serde_json::json!({
            "asset_id": self.asset_id,
            "authority": self.authority,
            "bond": self.bond,
            "denomination": self.denomination,
            "commitment": self.commitment,
            "score": self.score,
            "protocol_version": self.protocol_version,
            "exited_at": self.exited_at,
        });
        Digest32::hash(&serde_json::to_vec(&material).unwrap_or_default())
    }

    /// Whether the digest still matches the content.
    pub fn verify(&self) -> bool {
        self.digest == self.content_digest()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MigrationManager {
    /// Newest protocol version this deployment runs
    current_version: u32,
}

impl MigrationManager {
    pub fn new(current_version: u32) -> Self {
        Self { current_version }
    }

    /// Move the record to `target` under `protocol_version`, returning the
    /// successor. The old record is left `Migrated` with an empty bond.
    pub fn migrate(
        &self,
        record: &mut AgentTrustRecord,
        target: AssetId,
        protocol_version: u32,
        now: DateTime<Utc>,
    ) -> BondResult<AgentTrustRecord> {
        if record.state.is_terminal() {
            return Err(BondError::RecordTerminal {
                asset_id: record.asset_id.clone(),
                state: record.state,
            });
        }
        if target == record.asset_id {
            return Err(BondError::InvalidConfig(
                "migration target must be a new asset id".into(),
            ));
        }
        if protocol_version <= record.protocol_version || protocol_version > self.current_version
        {
            return Err(BondError::InvalidConfig(format!(
                "cannot migrate from protocol v{} to v{} (deployment runs v{})",
                record.protocol_version, protocol_version, self.current_version
            )));
        }

        let carried = record.bond.release_all();
        let mut bond = EscrowLedger::new(&target, record.bond.denomination.clone());
        bond.fund(carried);

        let mut successor = record.clone();
        successor.asset_id = target.clone();
        successor.bond = bond;
        successor.protocol_version = protocol_version;
        successor.migrated_from = Some(record.asset_id.clone());
        successor.migrated_to = None;
        successor.last_transfer_timestamp = None;
        successor.fees = Default::default();
        successor.created_at = now;
        successor.updated_at = now;
        successor.revision = 0;

        info!(
            from = %record.asset_id,
            to = %target,
            from_version = record.protocol_version,
            to_version = protocol_version,
            bond = carried.0,
            state = %record.state,
            "Agent migrated"
        );

        record.state = AgentState::Migrated;
        record.migrated_to = Some(target);
        record.unbonding_deadline = None;
        Ok(successor)
    }

    /// Drain the bond into a portable identity and destroy the record.
    ///
    /// A bond still inside its unbonding grace period cannot leave this way.
    pub fn sovereign_exit(
        record: &mut AgentTrustRecord,
        now: DateTime<Utc>,
    ) -> BondResult<PortableIdentity> {
        if record.has_open_dispute() {
            return Err(BondError::invalid_transition(
                record.state,
                CommandKind::SovereignExit,
            ));
        }
        record.ensure_grace_elapsed(now)?;

        let bond = record.bond.release_all();
        let mut portable = PortableIdentity {
            asset_id: record.asset_id.clone(),
            authority: record.authority.clone(),
            bond,
            denomination: record.bond.denomination.clone(),
            commitment: record.validation.commitment,
            score: record.validation.score,
            protocol_version: record.protocol_version,
            exited_at: now,
            digest: Digest32::zero(),
        };
        portable.digest = portable.content_digest();

        info!(
            asset = %record.asset_id,
            bond = bond.0,
            epoch = portable.commitment.epoch,
            "Sovereign exit"
        );

        record.state = AgentState::Dead;
        record.unbonding_deadline = None;
        Ok(portable)
    }
}
