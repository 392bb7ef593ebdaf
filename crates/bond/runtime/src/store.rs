//! Record persistence.
//!
//! One snapshot per asset id: the trust record plus its audit entries.
//! `create` is the only way a new asset id enters the store, so it is also
//! where asset-id uniqueness is enforced.

use crate::audit::AuditEntry;
use crate::record::AgentTrustRecord;
use async_trait::async_trait;
use bond_types::{AssetId, BondError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    AlreadyExists(AssetId),
    #[error("record not found: {0}")]
    NotFound(AssetId),
    #[error("record store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for BondError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(id) => BondError::RecordAlreadyExists(id),
            StoreError::NotFound(id) => BondError::RecordNotFound(id),
            other => BondError::Storage(other.to_string()),
        }
    }
}

/// Persisted form of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub record: AgentTrustRecord,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new snapshot; fails if the asset id is taken.
    async fn create(&self, snapshot: &AgentSnapshot) -> Result<(), StoreError>;

    /// Overwrite an existing record and append audit entries.
    async fn save(
        &self,
        record: &AgentTrustRecord,
        appended: &[AuditEntry],
    ) -> Result<(), StoreError>;

    async fn remove(&self, asset_id: &AssetId) -> Result<(), StoreError>;

    async fn load_all(&self) -> Result<Vec<AgentSnapshot>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    agents: BTreeMap<AssetId, AgentSnapshot>,
}

impl StoreData {
    fn create(&mut self, snapshot: &AgentSnapshot) -> Result<(), StoreError> {
        let asset_id = &snapshot.record.asset_id;
        if self.agents.contains_key(asset_id) {
            return Err(StoreError::AlreadyExists(asset_id.clone()));
        }
        self.agents.insert(asset_id.clone(), snapshot.clone());
        Ok(())
    }

    fn save(&mut self, record: &AgentTrustRecord, appended: &[AuditEntry]) -> Result<(), StoreError> {
        let snapshot = self
            .agents
            .get_mut(&record.asset_id)
            .ok_or_else(|| StoreError::NotFound(record.asset_id.clone()))?;
        snapshot.record = record.clone();
        snapshot.audit.extend_from_slice(appended);
        Ok(())
    }

    fn remove(&mut self, asset_id: &AssetId) -> Result<(), StoreError> {
        self.agents
            .remove(asset_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(asset_id.clone()))
    }
}

/// Volatile store for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    data: Mutex<StoreData>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, snapshot: &AgentSnapshot) -> Result<(), StoreError> {
        self.data.lock().await.create(snapshot)
    }

    async fn save(
        &self,
        record: &AgentTrustRecord,
        appended: &[AuditEntry],
    ) -> Result<(), StoreError> {
        self.data.lock().await.save(record, appended)
    }

    async fn remove(&self, asset_id: &AssetId) -> Result<(), StoreError> {
        self.data.lock().await.remove(asset_id)
    }

    async fn load_all(&self) -> Result<Vec<AgentSnapshot>, StoreError> {
        Ok(self.data.lock().await.agents.values().cloned().collect())
    }
}

/// JSON file store. The whole document is rewritten through a temp file
/// and renamed into place after every mutation.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileRecordStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => StoreData::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), agents = data.agents.len(), "Record store opened");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(tmp_path, &self.path).await?;
        Ok(())
    }

    /// Apply `change` to a copy, persist the copy, then swap it in.
    async fn mutate<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreData) -> Result<(), StoreError> + Send,
    {
        let mut guard = self.data.lock().await;
        let mut next = guard.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn create(&self, snapshot: &AgentSnapshot) -> Result<(), StoreError> {
        self.mutate(|data| data.create(snapshot)).await
    }

    async fn save(
        &self,
        record: &AgentTrustRecord,
        appended: &[AuditEntry],
    ) -> Result<(), StoreError> {
        self.mutate(|data| data.save(record, appended)).await
    }

    async fn remove(&self, asset_id: &AssetId) -> Result<(), StoreError> {
        self.mutate(|data| data.remove(asset_id)).await
    }

    async fn load_all(&self) -> Result<Vec<AgentSnapshot>, StoreError> {
        Ok(self.data.lock().await.agents.values().cloned().collect())
    }
}
