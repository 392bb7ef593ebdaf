//! In-memory asset and ownership ledger

use async_trait::async_trait;
use bond_runtime::{AssetLedger, CollaboratorError};
use bond_types::{AssetId, Identity};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const NAME: &str = "asset_ledger";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetEntry {
    pub holder: Option<Identity>,
    pub frozen: bool,
    pub burned: bool,
    pub last_transfer: Option<DateTime<Utc>>,
}

/// Asset ledger held in process memory.
///
/// Transfers are refused while an asset is frozen or burned, which is the
/// asset-layer half of the freeze contract.
#[derive(Debug, Default)]
pub struct InMemoryAssetLedger {
    assets: DashMap<AssetId, AssetEntry>,
    offline: AtomicBool,
}

impl InMemoryAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), CollaboratorError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable {
                collaborator: NAME,
                message: "ledger offline".into(),
            });
        }
        Ok(())
    }

    pub fn entry(&self, asset_id: &AssetId) -> AssetEntry {
        self.assets
            .get(asset_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn is_burned(&self, asset_id: &AssetId) -> bool {
        self.entry(asset_id).burned
    }

    /// Move the asset to `to`, stamping the transfer time.
    pub fn transfer(
        &self,
        asset_id: &AssetId,
        to: Identity,
        at: DateTime<Utc>,
    ) -> Result<(), CollaboratorError> {
        self.check_online()?;
        let mut entry = self.assets.entry(asset_id.clone()).or_default();
        if entry.burned {
            return Err(CollaboratorError::Rejected {
                collaborator: NAME,
                message: format!("asset {} is burned", asset_id),
            });
        }
        if entry.frozen {
            return Err(CollaboratorError::Rejected {
                collaborator: NAME,
                message: format!("asset {} is frozen", asset_id),
            });
        }
        debug!(asset = %asset_id, to = %to, "Asset transferred");
        entry.holder = Some(to);
        entry.last_transfer = Some(at);
        Ok(())
    }
}

#[async_trait]
impl AssetLedger for InMemoryAssetLedger {
    async fn is_frozen(&self, asset_id: &AssetId) -> Result<bool, CollaboratorError> {
        self.check_online()?;
        Ok(self.entry(asset_id).frozen)
    }

    async fn set_frozen(&self, asset_id: &AssetId, frozen: bool) -> Result<(), CollaboratorError> {
        self.check_online()?;
        let mut entry = self.assets.entry(asset_id.clone()).or_default();
        if entry.burned && !frozen {
            return Err(CollaboratorError::Rejected {
                collaborator: NAME,
                message: format!("asset {} is burned", asset_id),
            });
        }
        entry.frozen = frozen;
        Ok(())
    }

    async fn burn(&self, asset_id: &AssetId) -> Result<(), CollaboratorError> {
        self.check_online()?;
        let mut entry = self.assets.entry(asset_id.clone()).or_default();
        entry.burned = true;
        entry.frozen = true;
        entry.holder = None;
        info!(asset = %asset_id, "Asset burned");
        Ok(())
    }

    async fn last_transfer(
        &self,
        asset_id: &AssetId,
    ) -> Result<Option<DateTime<Utc>>, CollaboratorError> {
        self.check_online()?;
        Ok(self.entry(asset_id).last_transfer)
    }

    async fn holder(&self, asset_id: &AssetId) -> Result<Option<Identity>, CollaboratorError> {
        self.check_online()?;
        Ok(self.entry(asset_id).holder)
    }
}
