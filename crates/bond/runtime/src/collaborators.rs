//! Ports to the external collaborators the bond runtime depends on.
//!
//! The asset ledger, attestation infrastructure, and archival storage live
//! outside this system. Implementations are injected into the
//! [`crate::LifecycleStateMachine`]; `bond-adapters` ships in-memory and
//! Ed25519-backed versions.

use async_trait::async_trait;
use bond_types::{Amount, ArchiveRef, AssetId, BondError, BondResult, Identity, ValidationReceipt};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} rejected request: {message}")]
    Rejected {
        collaborator: &'static str,
        message: String,
    },
}

impl From<CollaboratorError> for BondError {
    fn from(err: CollaboratorError) -> Self {
        BondError::Collaborator(err.to_string())
    }
}

/// The asset and ownership ledger the record is bound to
#[async_trait]
pub trait AssetLedger: Send + Sync {
    async fn is_frozen(&self, asset_id: &AssetId) -> Result<bool, CollaboratorError>;

    async fn set_frozen(&self, asset_id: &AssetId, frozen: bool) -> Result<(), CollaboratorError>;

    async fn burn(&self, asset_id: &AssetId) -> Result<(), CollaboratorError>;

    /// Timestamp of the last ownership change, written by the asset layer.
    async fn last_transfer(
        &self,
        asset_id: &AssetId,
    ) -> Result<Option<DateTime<Utc>>, CollaboratorError>;

    /// Current holder, or `None` if the asset has never been transferred.
    async fn holder(&self, asset_id: &AssetId) -> Result<Option<Identity>, CollaboratorError>;
}

/// Attestation-issuing infrastructure
#[async_trait]
pub trait AttestationVerifier: Send + Sync {
    /// Cryptographic check of the receipt's signature or reference.
    async fn verify_receipt(&self, receipt: &ValidationReceipt) -> Result<bool, CollaboratorError>;

    /// Stake currently bonded by a validator.
    async fn validator_stake(&self, validator: &Identity) -> Result<Amount, CollaboratorError>;
}

/// Permanent off-chain archival storage
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn store(&self, blob: &[u8]) -> Result<ArchiveRef, CollaboratorError>;
}

/// Reputation lookups by asset id
#[async_trait]
pub trait ReputationResolver: Send + Sync {
    async fn get_normalized_score(&self, asset_id: &AssetId) -> BondResult<u8>;
}

/// Wall-clock source. Grace deadlines and consensus windows compare against it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut guard) => *guard = at,
            Err(poisoned) => *poisoned.into_inner() = at,
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Bundle of collaborator handles shared by the runtime
#[derive(Clone)]
pub struct Collaborators {
    pub assets: Arc<dyn AssetLedger>,
    pub attestations: Arc<dyn AttestationVerifier>,
    pub archive: Arc<dyn ArchiveStore>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(
        assets: Arc<dyn AssetLedger>,
        attestations: Arc<dyn AttestationVerifier>,
        archive: Arc<dyn ArchiveStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            assets,
            attestations,
            archive,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
