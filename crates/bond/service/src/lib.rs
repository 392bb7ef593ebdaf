//! REST surface over the agent registry.

#![deny(unsafe_code)]

pub mod config;

pub use config::{
    CallerEntry, ScorerKind, ScoringConfig, ServiceConfig, StorageConfig, ValidatorEntry,
};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bond_adapters::{
    CallerKeys, Ed25519ReceiptVerifier, InMemoryArchive, InMemoryAssetLedger, PermissiveVerifier,
};
use bond_runtime::{
    AgentRegistry, AgentTrustRecord, AttestationVerifier, AuditEntry, CollaboratorError,
    Collaborators, CommandOutcome, FileRecordStore, LifecycleStateMachine, MemoryRecordStore,
    RecordStore, ReputationResolver, StoreError, SystemClock, TreasuryView,
};
use bond_types::{
    AssetId, BondError, CommandEnvelope, Digest32, Identity, ReputationCommitment,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// How far a signed command's `issued_at` may drift from the service clock
pub const COMMAND_FRESHNESS_SECS: i64 = 300;

#[derive(Clone)]
pub struct ServiceState {
    pub registry: Arc<AgentRegistry>,
    pub assets: Arc<InMemoryAssetLedger>,
    pub archive: Arc<InMemoryArchive>,
    pub callers: Arc<CallerKeys>,
    pub require_signed_commands: bool,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let scorer = config.scorer();
        let ServiceConfig {
            protocol,
            storage,
            accept_unsigned_receipts,
            validators,
            require_signed_commands,
            callers: caller_entries,
            ..
        } = config;

        let callers = CallerKeys::new();
        for entry in caller_entries {
            callers.register_hex(entry.id, &entry.public_key)?;
        }

        let verifier: Arc<dyn AttestationVerifier> = if accept_unsigned_receipts {
            let verifier = validators.into_iter().fold(PermissiveVerifier::new(), |v, entry| {
                v.with_stake(entry.id, entry.stake)
            });
            Arc::new(verifier)
        } else {
            let verifier = Ed25519ReceiptVerifier::new();
            for entry in validators {
                let key = entry.public_key.as_deref().unwrap_or_default();
                verifier.register_hex(entry.id, key, entry.stake)?;
            }
            Arc::new(verifier)
        };

        let assets = Arc::new(InMemoryAssetLedger::new());
        let archive = Arc::new(InMemoryArchive::new());
        let collaborators = Collaborators::new(
            assets.clone(),
            verifier,
            archive.clone(),
            Arc::new(SystemClock),
        );
        let machine = LifecycleStateMachine::with_scorer(protocol, collaborators, scorer)?;

        let store: Arc<dyn RecordStore> = match storage.state_file {
            Some(path) => Arc::new(FileRecordStore::open(path).await?),
            None => Arc::new(MemoryRecordStore::new()),
        };
        let registry = AgentRegistry::open(machine, store).await?;
        registry.sync_assets().await?;
        info!(agents = registry.len(), "Bond service state ready");

        Ok(Self {
            registry: Arc::new(registry),
            assets,
            archive,
            callers: Arc::new(callers),
            require_signed_commands,
        })
    }

    /// Check the signature on a command from a keyed caller.
    ///
    /// Callers without a registered key pass unless signed commands are required.
    pub fn authenticate(&self, asset_id: &AssetId, request: &CommandRequest) -> Result<(), ApiError> {
        let caller = &request.envelope.caller;
        if !self.callers.is_registered(caller) {
            if self.require_signed_commands {
                warn!(caller = %caller, "Command from unknown caller");
                return Err(ApiError::unauthorized(format!("caller {} has no registered key", caller)));
            }
            return Ok(());
        }

        let (Some(signature), Some(issued_at)) = (&request.signature, request.issued_at) else {
            warn!(caller = %caller, "Unsigned command from keyed caller");
            return Err(ApiError::unauthorized(format!("commands from {} must be signed", caller)));
        };
        let drift = (self.registry.machine().now() - issued_at).num_seconds().abs();
        if drift > COMMAND_FRESHNESS_SECS {
            return Err(ApiError::unauthorized(format!(
                "signed command issued {}s away from service time",
                drift
            )));
        }
        if !self
            .callers
            .verify(asset_id, &request.envelope, issued_at, signature)
        {
            warn!(caller = %caller, asset = %asset_id, "Command signature failed verification");
            return Err(ApiError::unauthorized(format!(
                "signature from {} failed verification",
                caller
            )));
        }
        Ok(())
    }
}

/// Wire form of a command: the envelope plus an optional caller signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    /// Hex Ed25519 signature over `CommandEnvelope::signing_message`
    #[serde(default)]
    pub signature: Option<String>,
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/agents", get(list_agents).post(register_agent))
        .route("/v1/agents/:asset_id", get(get_agent))
        .route("/v1/agents/:asset_id/commands", post(run_command))
        .route("/v1/agents/:asset_id/audit", get(list_audit))
        .route("/v1/agents/:asset_id/score", get(get_score))
        .route(
            "/v1/agents/:asset_id/consensus/:digest",
            get(get_consensus),
        )
        .route("/v1/assets/:asset_id", get(get_asset))
        .route("/v1/assets/:asset_id/transfer", post(transfer_asset))
        .route("/v1/treasury", get(get_treasury))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("bond error: {0}")]
    Bond(#[from] BondError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Bond(#[from] BondError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

/// HTTP status for each bond error kind.
fn bond_status(err: &BondError) -> StatusCode {
    match err {
        BondError::RecordNotFound(_) => StatusCode::NOT_FOUND,
        BondError::Unauthorized { .. } | BondError::ValidatorNotEligible { .. } => {
            StatusCode::FORBIDDEN
        }
        BondError::InvalidConfig(_) | BondError::InvalidAttestation(_) => StatusCode::BAD_REQUEST,
        BondError::InsufficientBond { .. }
        | BondError::InsufficientFee { .. }
        | BondError::ExcessFee { .. }
        | BondError::CollateralBelowMinimum { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BondError::InvalidStateTransition { .. }
        | BondError::AlreadyChallenged(_)
        | BondError::DisputeAlreadyResolved(_)
        | BondError::GracePeriodNotElapsed { .. }
        | BondError::ThresholdNotMet { .. }
        | BondError::RecordAlreadyExists(_)
        | BondError::RecordTerminal { .. }
        | BondError::HistoryEpochSealed { .. } => StatusCode::CONFLICT,
        BondError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        BondError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Bond(err) => (
                bond_status(&err),
                Json(serde_json::json!({ "error": err.to_string(), "kind": err.kind() })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    protocol_version: u32,
    agents: usize,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "bond-service",
        protocol_version: state.registry.machine().config().protocol_version,
        agents: state.registry.len(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub asset_id: AssetId,
    pub authority: Identity,
    pub owner: Identity,
}

async fn register_agent(
    State(state): State<ServiceState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AgentTrustRecord>), ApiError> {
    let record = state
        .registry
        .register(request.asset_id, request.authority, request.owner)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_agents(State(state): State<ServiceState>) -> Json<Vec<AssetId>> {
    Json(state.registry.asset_ids())
}

async fn get_agent(
    State(state): State<ServiceState>,
    Path(asset_id): Path<String>,
) -> Result<Json<AgentTrustRecord>, ApiError> {
    Ok(Json(state.registry.get(&AssetId::new(asset_id)).await?))
}

async fn run_command(
    State(state): State<ServiceState>,
    Path(asset_id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let asset_id = AssetId::new(asset_id);
    state.authenticate(&asset_id, &request)?;
    let outcome = state.registry.execute(&asset_id, request.envelope).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Clone, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    order: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct AuditResponse {
    asset_id: AssetId,
    total: usize,
    returned: usize,
    items: Vec<AuditEntry>,
}

async fn list_audit(
    State(state): State<ServiceState>,
    Path(asset_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditResponse>, ApiError> {
    let asset_id = AssetId::new(asset_id);
    let mut entries = state.registry.audit(&asset_id).await?;

    let order = query.order.as_deref().unwrap_or("asc").to_ascii_lowercase();
    if order == "desc" {
        entries.reverse();
    } else if order != "asc" {
        return Err(ApiError::bad_request(format!(
            "invalid order '{}'; expected asc or desc",
            order
        )));
    }

    let total = entries.len();
    let items: Vec<AuditEntry> = entries
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(100).min(1000))
        .collect();

    Ok(Json(AuditResponse {
        asset_id,
        total,
        returned: items.len(),
        items,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct ScoreResponse {
    asset_id: AssetId,
    score: u8,
    commitment: ReputationCommitment,
    committed_claims: u64,
    pending_claims: usize,
}

async fn get_score(
    State(state): State<ServiceState>,
    Path(asset_id): Path<String>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let asset_id = AssetId::new(asset_id);
    let score = state.registry.get_normalized_score(&asset_id).await?;
    let record = state.registry.get(&asset_id).await?;
    Ok(Json(ScoreResponse {
        asset_id,
        score,
        commitment: record.validation.commitment,
        committed_claims: record.validation.committed_claims,
        pending_claims: record.validation.pending.len(),
    }))
}

async fn get_consensus(
    State(state): State<ServiceState>,
    Path((asset_id, digest)): Path<(String, String)>,
) -> Result<Json<ReputationCommitment>, ApiError> {
    let digest = Digest32::from_hex(&digest)
        .ok_or_else(|| ApiError::bad_request(format!("invalid digest '{}'", digest)))?;
    let commitment = state
        .registry
        .consensus_status(&AssetId::new(asset_id), &digest)
        .await?;
    Ok(Json(commitment))
}

#[derive(Debug, Clone, Serialize)]
struct AssetResponse {
    asset_id: AssetId,
    holder: Option<Identity>,
    frozen: bool,
    burned: bool,
    last_transfer: Option<DateTime<Utc>>,
}

fn asset_response(state: &ServiceState, asset_id: AssetId) -> AssetResponse {
    let entry = state.assets.entry(&asset_id);
    AssetResponse {
        asset_id,
        holder: entry.holder,
        frozen: entry.frozen,
        burned: entry.burned,
        last_transfer: entry.last_transfer,
    }
}

async fn get_asset(
    State(state): State<ServiceState>,
    Path(asset_id): Path<String>,
) -> Json<AssetResponse> {
    Json(asset_response(&state, AssetId::new(asset_id)))
}

#[derive(Debug, Clone, Deserialize)]
struct TransferRequest {
    to: Identity,
}

async fn transfer_asset(
    State(state): State<ServiceState>,
    Path(asset_id): Path<String>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<AssetResponse>, ApiError> {
    let asset_id = AssetId::new(asset_id);
    let now = state.registry.machine().now();
    match state.assets.transfer(&asset_id, request.to, now) {
        Ok(()) => Ok(Json(asset_response(&state, asset_id))),
        Err(err @ CollaboratorError::Rejected { .. }) => Err(ApiError::Http {
            status: StatusCode::CONFLICT,
            message: err.to_string(),
        }),
        Err(err) => Err(BondError::from(err).into()),
    }
}

async fn get_treasury(State(state): State<ServiceState>) -> Json<TreasuryView> {
    Json(state.registry.treasury().await)
}
