//! Error types for the bond lifecycle

use crate::{AgentState, Amount, AssetId, CommandKind, Identity};

/// Errors that can occur in bond operations.
///
/// Every failure leaves the committed record untouched; the variant tells
/// the caller how to remediate (fund more, wait, get whitelisted, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BondError {
    #[error("invalid state transition: {command} is not legal in state {state}")]
    InvalidStateTransition {
        state: AgentState,
        command: CommandKind,
    },

    #[error("insufficient bond: required {required}, available {available}")]
    InsufficientBond { required: Amount, available: Amount },

    #[error("insufficient fee: required {required}, offered {offered}")]
    InsufficientFee { required: Amount, offered: Amount },

    #[error("fee overpaid: required {required}, offered {offered}")]
    ExcessFee { required: Amount, offered: Amount },

    #[error("unauthorized: {caller} may not {command}")]
    Unauthorized {
        caller: Identity,
        command: CommandKind,
    },

    #[error("agent {0} already has an open dispute")]
    AlreadyChallenged(AssetId),

    #[error("dispute {0} has already been resolved")]
    DisputeAlreadyResolved(String),

    #[error("grace period not elapsed: {remaining_secs}s remaining")]
    GracePeriodNotElapsed { remaining_secs: i64 },

    #[error("threshold not met: required {required} validators, have {current}")]
    ThresholdNotMet { required: u32, current: u32 },

    #[error("validator {validator} not eligible: {reason}")]
    ValidatorNotEligible { validator: Identity, reason: String },

    #[error("invalid attestation: {0}")]
    InvalidAttestation(String),

    #[error("collateral below minimum: bond {bond} under floor {floor}")]
    CollateralBelowMinimum { bond: Amount, floor: Amount },

    #[error("record not found: {0}")]
    RecordNotFound(AssetId),

    #[error("record already exists: {0}")]
    RecordAlreadyExists(AssetId),

    #[error("record {asset_id} is terminal ({state})")]
    RecordTerminal {
        asset_id: AssetId,
        state: AgentState,
    },

    #[error("history already anchored for reputation epoch {epoch}")]
    HistoryEpochSealed { epoch: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("collaborator failure: {0}")]
    Collaborator(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl BondError {
    /// Stable machine-readable kind, used by the service surface.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::InsufficientBond { .. } => "insufficient_bond",
            Self::InsufficientFee { .. } => "insufficient_fee",
            Self::ExcessFee { .. } => "excess_fee",
            Self::Unauthorized { .. } => "unauthorized",
            Self::AlreadyChallenged(_) => "already_challenged",
            Self::DisputeAlreadyResolved(_) => "dispute_already_resolved",
            Self::GracePeriodNotElapsed { .. } => "grace_period_not_elapsed",
            Self::ThresholdNotMet { .. } => "threshold_not_met",
            Self::ValidatorNotEligible { .. } => "validator_not_eligible",
            Self::InvalidAttestation(_) => "invalid_attestation",
            Self::CollateralBelowMinimum { .. } => "collateral_below_minimum",
            Self::RecordNotFound(_) => "record_not_found",
            Self::RecordAlreadyExists(_) => "record_already_exists",
            Self::RecordTerminal { .. } => "record_terminal",
            Self::HistoryEpochSealed { .. } => "history_epoch_sealed",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Collaborator(_) => "collaborator",
            Self::Storage(_) => "storage",
        }
    }

    pub fn invalid_transition(state: AgentState, command: CommandKind) -> Self {
        Self::InvalidStateTransition { state, command }
    }

    pub fn unauthorized(caller: &Identity, command: CommandKind) -> Self {
        Self::Unauthorized {
            caller: caller.clone(),
            command,
        }
    }
}

/// Result type alias for bond operations
pub type BondResult<T> = Result<T, BondError>;
