//! Shared unit-test fixtures.

use crate::collaborators::{
    ArchiveStore, AssetLedger, AttestationVerifier, CollaboratorError, Collaborators, SystemClock,
};
use crate::record::AgentTrustRecord;
use async_trait::async_trait;
use bond_types::{
    AgentState, Amount, ArchiveRef, AssetId, Identity, OutcomePayload, ProtocolConfig,
    ValidationReceipt,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub fn active_record() -> AgentTrustRecord {
    let mut record = AgentTrustRecord::new(
        AssetId::new("nft-1"),
        Identity::new("auth"),
        Identity::new("owner"),
        &ProtocolConfig::default(),
        Utc::now(),
    );
    record.bond.fund(Amount::new(1000));
    record.registration_fee_paid = true;
    record.state = AgentState::Active;
    record
}

pub fn receipt(validator: &str, score: u8) -> ValidationReceipt {
    ValidationReceipt::new(
        Identity::new(validator),
        AssetId::new("nft-1"),
        OutcomePayload::new("task-1", score, Amount::new(1_000)),
    )
}

pub struct StakeBook {
    stakes: HashMap<Identity, Amount>,
    accept_signatures: bool,
}

impl StakeBook {
    pub fn with(stakes: &[(&str, u64)]) -> Self {
        Self {
            stakes: stakes
                .iter()
                .map(|(id, stake)| (Identity::new(*id), Amount::new(*stake)))
                .collect(),
            accept_signatures: true,
        }
    }

    pub fn rejecting_signatures(mut self) -> Self {
        self.accept_signatures = false;
        self
    }
}

#[async_trait]
impl AttestationVerifier for StakeBook {
    async fn verify_receipt(&self, _receipt: &ValidationReceipt) -> Result<bool, CollaboratorError> {
        Ok(self.accept_signatures)
    }

    async fn validator_stake(&self, validator: &Identity) -> Result<Amount, CollaboratorError> {
        Ok(self.stakes.get(validator).copied().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeAssets {
    frozen: Mutex<HashSet<AssetId>>,
    transfers: Mutex<HashMap<AssetId, DateTime<Utc>>>,
    holders: Mutex<HashMap<AssetId, Identity>>,
}

impl FakeAssets {
    pub fn record_transfer(&self, asset_id: &AssetId, at: DateTime<Utc>) {
        self.transfers.lock().unwrap().insert(asset_id.clone(), at);
    }

    pub fn transfer_to(&self, asset_id: &AssetId, holder: &str, at: DateTime<Utc>) {
        self.record_transfer(asset_id, at);
        self.holders
            .lock()
            .unwrap()
            .insert(asset_id.clone(), Identity::new(holder));
    }
}

#[async_trait]
impl AssetLedger for FakeAssets {
    async fn is_frozen(&self, asset_id: &AssetId) -> Result<bool, CollaboratorError> {
        Ok(self.frozen.lock().unwrap().contains(asset_id))
    }

    async fn set_frozen(&self, asset_id: &AssetId, frozen: bool) -> Result<(), CollaboratorError> {
        let mut set = self.frozen.lock().unwrap();
        if frozen {
            set.insert(asset_id.clone());
        } else {
            set.remove(asset_id);
        }
        Ok(())
    }

    async fn burn(&self, _asset_id: &AssetId) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn last_transfer(
        &self,
        asset_id: &AssetId,
    ) -> Result<Option<DateTime<Utc>>, CollaboratorError> {
        Ok(self.transfers.lock().unwrap().get(asset_id).copied())
    }

    async fn holder(&self, asset_id: &AssetId) -> Result<Option<Identity>, CollaboratorError> {
        Ok(self.holders.lock().unwrap().get(asset_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeArchive;

#[async_trait]
impl ArchiveStore for FakeArchive {
    async fn store(&self, blob: &[u8]) -> Result<ArchiveRef, CollaboratorError> {
        Ok(ArchiveRef::new(format!("mem:{}", blake3::hash(blob).to_hex())))
    }
}

pub fn collaborators() -> (Collaborators, Arc<FakeAssets>) {
    let assets = Arc::new(FakeAssets::default());
    let collaborators = Collaborators::new(
        assets.clone(),
        Arc::new(StakeBook::with(&[("v1", 500), ("v2", 500), ("v3", 500)])),
        Arc::new(FakeArchive),
        Arc::new(SystemClock),
    );
    (collaborators, assets)
}
