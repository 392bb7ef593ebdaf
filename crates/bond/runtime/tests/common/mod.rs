//! Shared harness: a registry wired to the in-memory adapters and a manual clock.

#![allow(dead_code)]

use bond_adapters::{sign_receipt, Ed25519ReceiptVerifier, InMemoryArchive, InMemoryAssetLedger};
use bond_runtime::{
    AgentRegistry, Clock, Collaborators, CommandOutcome, LifecycleStateMachine, ManualClock,
    MemoryRecordStore, RecordStore,
};
use bond_types::{
    Amount, AssetId, BondResult, Command, CommandEnvelope, Identity, OutcomePayload, ProtocolConfig,
    ValidationReceipt,
};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use std::sync::Arc;

pub const AUTHORITY: &str = "authority";
pub const OWNER: &str = "owner";
pub const GOVERNANCE: &str = "gov";

pub fn config(protocol_version: u32) -> ProtocolConfig {
    ProtocolConfig {
        protocol_version,
        governance: Identity::new(GOVERNANCE),
        ..ProtocolConfig::default()
    }
}

pub fn validator_key(name: &str) -> SigningKey {
    SigningKey::from_bytes(blake3::hash(name.as_bytes()).as_bytes())
}

pub struct Harness {
    pub registry: Arc<AgentRegistry>,
    pub store: Arc<dyn RecordStore>,
    pub assets: Arc<InMemoryAssetLedger>,
    pub archive: Arc<InMemoryArchive>,
    pub verifier: Arc<Ed25519ReceiptVerifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(config(1)).await
    }

    pub async fn with_config(config: ProtocolConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryRecordStore::new())).await
    }

    pub async fn with_store(config: ProtocolConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::assemble(
            config,
            store,
            Arc::new(InMemoryAssetLedger::new()),
            Arc::new(InMemoryArchive::new()),
            Arc::new(Ed25519ReceiptVerifier::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .await
    }

    async fn assemble(
        config: ProtocolConfig,
        store: Arc<dyn RecordStore>,
        assets: Arc<InMemoryAssetLedger>,
        archive: Arc<InMemoryArchive>,
        verifier: Arc<Ed25519ReceiptVerifier>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let collaborators = Collaborators::new(
            assets.clone(),
            verifier.clone(),
            archive.clone(),
            clock.clone(),
        );
        let machine = LifecycleStateMachine::new(config, collaborators).unwrap();
        let registry = AgentRegistry::open(machine, store.clone()).await.unwrap();
        Self {
            registry: Arc::new(registry),
            store,
            assets,
            archive,
            verifier,
            clock,
        }
    }

    /// Reopen the same store and collaborators under another deployment config.
    pub async fn reopen(&self, config: ProtocolConfig) -> Self {
        Self::assemble(
            config,
            self.store.clone(),
            self.assets.clone(),
            self.archive.clone(),
            self.verifier.clone(),
            self.clock.clone(),
        )
        .await
    }

    pub fn add_validator(&self, name: &str, stake: u64) {
        self.verifier.register(
            Identity::new(name),
            validator_key(name).verifying_key(),
            Amount::new(stake),
        );
    }

    pub fn signed_receipt(
        &self,
        validator: &str,
        asset_id: &AssetId,
        task: &str,
        score: u8,
    ) -> ValidationReceipt {
        let receipt = ValidationReceipt::new(
            Identity::new(validator),
            asset_id.clone(),
            OutcomePayload::new(task, score, Amount::new(1_000)),
        )
        .with_issued_at(self.clock.now());
        sign_receipt(&validator_key(validator), receipt)
    }

    pub async fn run(
        &self,
        asset_id: &AssetId,
        caller: &str,
        command: Command,
    ) -> BondResult<CommandOutcome> {
        self.registry
            .execute(asset_id, CommandEnvelope::new(Identity::new(caller), command))
            .await
    }

    pub async fn register(&self, id: &str) -> AssetId {
        let asset_id = AssetId::new(id);
        self.registry
            .register(asset_id.clone(), Identity::new(AUTHORITY), Identity::new(OWNER))
            .await
            .unwrap();
        asset_id
    }

    /// Register and activate with `bond`, paying the default registration fee.
    pub async fn active_agent(&self, id: &str, bond: u64) -> AssetId {
        let asset_id = self.register(id).await;
        self.run(
            &asset_id,
            AUTHORITY,
            Command::Activate {
                bond_amount: Amount::new(bond),
                fee: Amount::new(10),
            },
        )
        .await
        .unwrap();
        asset_id
    }
}
