//! Agent Bond runtime.
//!
//! Every external action enters the [`LifecycleStateMachine`], which checks
//! the caller's role and the record's state before delegating to the escrow
//! ledger, validation aggregator, dispute resolver, collateral monitor, fee
//! router, or migration manager. The [`AgentRegistry`] serializes commands
//! per agent and commits a post-state only after collaborator side effects
//! and the durable write have succeeded.

#![deny(unsafe_code)]

pub mod audit;
pub mod collateral;
pub mod collaborators;
pub mod dispute;
pub mod escrow;
pub mod fees;
pub mod lifecycle;
pub mod migration;
pub mod record;
pub mod registry;
pub mod scoring;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod fixtures;

pub use audit::{AuditEntry, AuditTrail};
pub use collateral::{CollateralBreach, CollateralMonitor};
pub use collaborators::{
    ArchiveStore, AssetLedger, AttestationVerifier, Clock, CollaboratorError, Collaborators,
    ManualClock, ReputationResolver, SystemClock,
};
pub use dispute::{DisputeRecord, DisputeResolution, DisputeResolver, DisputeStatus};
pub use escrow::EscrowLedger;
pub use fees::{FeeAccount, FeeKind, FeeRouter, SeizureSplit};
pub use lifecycle::{AssetEffect, CommandOutcome, LifecycleEvent, LifecycleStateMachine};
pub use migration::{MigrationManager, PortableIdentity};
pub use record::{AgentTrustRecord, HistoryPointer};
pub use registry::{AgentRegistry, TreasuryView};
pub use scoring::{DecayingScorer, RunningMeanScorer, ScoringStrategy};
pub use store::{AgentSnapshot, FileRecordStore, MemoryRecordStore, RecordStore, StoreError};
pub use validation::{AttestationOutcome, PendingClaim, ValidationAggregator, ValidationBook};
