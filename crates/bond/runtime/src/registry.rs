//! Agent registry
//!
//! Owns every committed record. Commands on one agent are serialized by a
//! per-record async mutex held for the whole command, collaborator awaits
//! included; different agents only share the index. A command runs against
//! a cloned draft, applies asset side effects, persists, and only then
//! replaces the committed record and audit trail.

use crate::audit::{AuditEntry, AuditTrail};
use crate::collaborators::ReputationResolver;
use crate::fees::FeeAccount;
use crate::lifecycle::{AssetEffect, CommandOutcome, LifecycleEvent, LifecycleStateMachine};
use crate::record::AgentTrustRecord;
use crate::store::{AgentSnapshot, RecordStore};
use crate::validation::ValidationAggregator;
use async_trait::async_trait;
use bond_types::{
    Amount, AssetId, BondError, BondResult, CommandEnvelope, Digest32, Identity,
    ReputationCommitment,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

struct AgentSlot {
    record: AgentTrustRecord,
    audit: AuditTrail,
}

/// Protocol-wide fee totals
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryView {
    pub treasury: Identity,
    pub fees: FeeAccount,
    pub total: Amount,
    pub agents: usize,
}

pub struct AgentRegistry {
    machine: LifecycleStateMachine,
    store: Arc<dyn RecordStore>,
    agents: DashMap<AssetId, Arc<Mutex<AgentSlot>>>,
}

impl AgentRegistry {
    /// Load every persisted agent, verifying each audit chain.
    pub async fn open(
        machine: LifecycleStateMachine,
        store: Arc<dyn RecordStore>,
    ) -> BondResult<Self> {
        let agents = DashMap::new();
        for snapshot in store.load_all().await? {
            let asset_id = snapshot.record.asset_id.clone();
            let audit = AuditTrail::from_entries(asset_id.clone(), snapshot.audit)?;
            agents.insert(
                asset_id,
                Arc::new(Mutex::new(AgentSlot {
                    record: snapshot.record,
                    audit,
                })),
            );
        }
        info!(agents = agents.len(), "Agent registry opened");
        Ok(Self {
            machine,
            store,
            agents,
        })
    }

    pub fn machine(&self) -> &LifecycleStateMachine {
        &self.machine
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn asset_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn slot(&self, asset_id: &AssetId) -> BondResult<Arc<Mutex<AgentSlot>>> {
        self.agents
            .get(asset_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BondError::RecordNotFound(asset_id.clone()))
    }

    /// Create an `Uninitialized` record bound to `asset_id`.
    pub async fn register(
        &self,
        asset_id: AssetId,
        authority: Identity,
        owner: Identity,
    ) -> BondResult<AgentTrustRecord> {
        if asset_id.as_str().trim().is_empty() {
            return Err(BondError::InvalidConfig("asset id must be non-empty".into()));
        }
        if authority == owner {
            return Err(BondError::InvalidConfig(
                "authority and owner must be distinct identities".into(),
            ));
        }
        if self.agents.contains_key(&asset_id) {
            return Err(BondError::RecordAlreadyExists(asset_id));
        }

        let record = self
            .machine
            .new_record(asset_id.clone(), authority.clone(), owner.clone());
        let mut audit = AuditTrail::new(asset_id.clone());
        let built = audit.build_entries(
            record.revision,
            &[LifecycleEvent::Registered { authority, owner }],
            record.created_at,
        )?;

        let previous = self
            .apply_asset_effect(&asset_id, AssetEffect::for_state(record.state))
            .await?;
        let snapshot = AgentSnapshot {
            record: record.clone(),
            audit: built.clone(),
        };
        if let Err(err) = self.store.create(&snapshot).await {
            self.restore_frozen(&asset_id, previous).await;
            return Err(err.into());
        }

        audit.commit_entries(built)?;
        self.agents.insert(
            asset_id.clone(),
            Arc::new(Mutex::new(AgentSlot {
                record: record.clone(),
                audit,
            })),
        );
        info!(asset = %asset_id, authority = %record.authority, owner = %record.owner, "Agent registered");
        Ok(record)
    }

    /// Run one command against the committed record of `asset_id`.
    pub async fn execute(
        &self,
        asset_id: &AssetId,
        envelope: CommandEnvelope,
    ) -> BondResult<CommandOutcome> {
        let slot = self.slot(asset_id)?;
        let mut guard = slot.lock().await;

        let mut draft = guard.record.clone();
        let outcome = self.machine.execute(&mut draft, &envelope).await?;
        if outcome.noop {
            return Ok(outcome);
        }

        let entries = guard
            .audit
            .build_entries(draft.revision, &outcome.events, draft.updated_at)?;

        let successor = match outcome.successor.as_ref() {
            Some(next) => {
                let trail = AuditTrail::new(next.asset_id.clone());
                let built = trail.build_entries(
                    next.revision,
                    &[LifecycleEvent::MigratedFrom {
                        source: draft.asset_id.clone(),
                        protocol_version: next.protocol_version,
                    }],
                    next.created_at,
                )?;
                Some((next.clone(), trail, built))
            }
            None => None,
        };

        let mut restore = Vec::new();
        if let Some(effect) = outcome.asset_effect {
            let previous = self.apply_asset_effect(&draft.asset_id, effect).await?;
            restore.push((draft.asset_id.clone(), previous));
        }
        if let Some((next, _, _)) = successor.as_ref() {
            match self
                .apply_asset_effect(&next.asset_id, AssetEffect::for_state(next.state))
                .await
            {
                Ok(previous) => restore.push((next.asset_id.clone(), previous)),
                Err(err) => {
                    self.rollback_assets(restore).await;
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.persist(&draft, &entries, successor.as_ref()).await {
            self.rollback_assets(restore).await;
            return Err(err);
        }

        guard.audit.commit_entries(entries)?;
        guard.record = draft;
        drop(guard);

        if let Some((next, mut trail, built)) = successor {
            trail.commit_entries(built)?;
            let next_id = next.asset_id.clone();
            self.agents.insert(
                next_id.clone(),
                Arc::new(Mutex::new(AgentSlot {
                    record: next,
                    audit: trail,
                })),
            );
            info!(from = %asset_id, to = %next_id, "Successor record committed");
        }

        Ok(outcome)
    }

    async fn persist(
        &self,
        record: &AgentTrustRecord,
        entries: &[AuditEntry],
        successor: Option<&(AgentTrustRecord, AuditTrail, Vec<AuditEntry>)>,
    ) -> BondResult<()> {
        if let Some((next, _, built)) = successor {
            self.store
                .create(&AgentSnapshot {
                    record: next.clone(),
                    audit: built.clone(),
                })
                .await?;
        }
        if let Err(err) = self.store.save(record, entries).await {
            if let Some((next, _, _)) = successor {
                if let Err(cleanup) = self.store.remove(&next.asset_id).await {
                    error!(asset = %next.asset_id, error = %cleanup, "Failed to remove orphaned successor");
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Returns the prior frozen flag when the effect changed it.
    async fn apply_asset_effect(
        &self,
        asset_id: &AssetId,
        effect: AssetEffect,
    ) -> BondResult<Option<bool>> {
        let assets = &self.machine.collaborators().assets;
        match effect {
            AssetEffect::SetFrozen(frozen) => {
                let current = assets.is_frozen(asset_id).await?;
                if current == frozen {
                    return Ok(None);
                }
                assets.set_frozen(asset_id, frozen).await?;
                Ok(Some(current))
            }
            AssetEffect::Burn => {
                assets.burn(asset_id).await?;
                info!(asset = %asset_id, "Asset burn signalled");
                Ok(None)
            }
        }
    }

    async fn restore_frozen(&self, asset_id: &AssetId, previous: Option<bool>) {
        let Some(frozen) = previous else {
            return;
        };
        if let Err(err) = self
            .machine
            .collaborators()
            .assets
            .set_frozen(asset_id, frozen)
            .await
        {
            warn!(asset = %asset_id, error = %err, "Failed to restore asset freeze flag");
        }
    }

    async fn rollback_assets(&self, restore: Vec<(AssetId, Option<bool>)>) {
        for (asset_id, previous) in restore.into_iter().rev() {
            self.restore_frozen(&asset_id, previous).await;
        }
    }

    pub async fn get(&self, asset_id: &AssetId) -> BondResult<AgentTrustRecord> {
        let slot = self.slot(asset_id)?;
        let guard = slot.lock().await;
        Ok(guard.record.clone())
    }

    pub async fn audit(&self, asset_id: &AssetId) -> BondResult<Vec<AuditEntry>> {
        let slot = self.slot(asset_id)?;
        let guard = slot.lock().await;
        Ok(guard.audit.entries().to_vec())
    }

    pub async fn consensus_status(
        &self,
        asset_id: &AssetId,
        digest: &Digest32,
    ) -> BondResult<ReputationCommitment> {
        let slot = self.slot(asset_id)?;
        let guard = slot.lock().await;
        ValidationAggregator::consensus_status(&guard.record, digest)
    }

    /// Sum of every agent's fee counters.
    pub async fn treasury(&self) -> TreasuryView {
        let slots: Vec<Arc<Mutex<AgentSlot>>> =
            self.agents.iter().map(|e| e.value().clone()).collect();
        let mut fees = FeeAccount::default();
        for slot in &slots {
            let guard = slot.lock().await;
            fees = fees.merged(&guard.record.fees);
        }
        TreasuryView {
            treasury: self.machine.router().treasury().clone(),
            total: fees.treasury_total(),
            fees,
            agents: slots.len(),
        }
    }

    /// Push every record's freeze flag to the asset ledger.
    ///
    /// Run after `open` when the asset ledger does not share the record
    /// store's durability. Burns are never replayed.
    pub async fn sync_assets(&self) -> BondResult<usize> {
        let slots: Vec<Arc<Mutex<AgentSlot>>> =
            self.agents.iter().map(|e| e.value().clone()).collect();
        let mut changed = 0;
        for slot in slots {
            let guard = slot.lock().await;
            let effect = AssetEffect::for_state(guard.record.state);
            if self
                .apply_asset_effect(&guard.record.asset_id, effect)
                .await?
                .is_some()
            {
                changed += 1;
            }
        }
        info!(changed, "Asset freeze flags synchronized");
        Ok(changed)
    }
}

#[async_trait]
impl ReputationResolver for AgentRegistry {
    async fn get_normalized_score(&self, asset_id: &AssetId) -> BondResult<u8> {
        Ok(self.get(asset_id).await?.score())
    }
}
