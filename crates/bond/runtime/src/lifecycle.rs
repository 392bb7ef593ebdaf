//! Lifecycle state machine
//!
//! The composition root of the runtime. Every command is checked in the
//! same order: terminal record, caller role, command-specific conflicts,
//! then the legality table in [`AgentState::permits`]. Only then does the
//! machine delegate to the subordinate component. All mutation happens on
//! the caller's draft record; the collateral monitor runs last and may
//! override the requested transition with `Frozen`.

use crate::collateral::CollateralMonitor;
use crate::collaborators::Collaborators;
use crate::dispute::{DisputeResolution, DisputeResolver};
use crate::fees::{FeeKind, FeeRouter};
use crate::migration::{MigrationManager, PortableIdentity};
use crate::record::{AgentTrustRecord, HistoryPointer};
use crate::scoring::{RunningMeanScorer, ScoringStrategy};
use crate::validation::{AttestationOutcome, ValidationAggregator};
use bond_types::{
    AgentState, Amount, ArchiveRef, AssetId, BondError, BondResult, Command, CommandEnvelope,
    CommandKind, ConsensusPolicy, DisputeId, DisputeVerdict, Digest32, FeeConfig, Identity,
    ProtocolConfig, SlashRemainder,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle event recorded in the audit trail
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Registered {
        authority: Identity,
        owner: Identity,
    },
    StateChanged {
        command: CommandKind,
        from: AgentState,
        to: AgentState,
    },
    BondFunded {
        amount: Amount,
        balance: Amount,
    },
    BondWithdrawn {
        amount: Amount,
        balance: Amount,
    },
    BondReleased {
        amount: Amount,
    },
    FeeCollected {
        kind: FeeKind,
        amount: Amount,
    },
    DisputeOpened {
        dispute_id: DisputeId,
        challenger: Identity,
    },
    DisputeResolved {
        dispute_id: DisputeId,
        verdict: DisputeVerdict,
        seized: Amount,
        vigorish: Amount,
        remainder: Amount,
        destination: Option<SlashRemainder>,
    },
    ClaimCommitted {
        digest: Digest32,
        score: u8,
        epoch: u64,
    },
    CollateralFrozen {
        bond: Amount,
        tvm: Amount,
        floor: Amount,
    },
    TvmReported {
        tvm: Amount,
    },
    FeeConfigUpdated {
        fees: FeeConfig,
    },
    WhitelistUpdated {
        validators: Option<usize>,
    },
    ConsensusPolicyUpdated {
        policy: ConsensusPolicy,
    },
    AuthorityTransferred {
        from: Identity,
        to: Identity,
    },
    HistoryAnchored {
        reference: ArchiveRef,
        epoch: u64,
    },
    MigratedTo {
        target: AssetId,
        protocol_version: u32,
    },
    MigratedFrom {
        source: AssetId,
        protocol_version: u32,
    },
    SovereignExit {
        digest: Digest32,
    },
    AssetBurned,
}

/// Side effect the asset collaborator must apply before the commit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetEffect {
    SetFrozen(bool),
    Burn,
}

impl AssetEffect {
    pub fn for_state(state: AgentState) -> Self {
        Self::SetFrozen(state.asset_frozen())
    }
}

/// Result of one successfully applied command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub asset_id: AssetId,
    pub command: CommandKind,
    pub previous_state: AgentState,
    pub state: AgentState,
    pub bond: Amount,
    /// Nothing changed; the registry skips the commit
    pub noop: bool,
    pub events: Vec<LifecycleEvent>,
    pub asset_effect: Option<AssetEffect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<DisputeResolution>,
    /// Bond handed back to the authority (unbond, burn)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successor: Option<AgentTrustRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portable: Option<PortableIdentity>,
}

impl CommandOutcome {
    fn start(record: &AgentTrustRecord, command: CommandKind) -> Self {
        Self {
            asset_id: record.asset_id.clone(),
            command,
            previous_state: record.state,
            state: record.state,
            bond: record.bond_amount(),
            noop: false,
            events: Vec::new(),
            asset_effect: None,
            attestation: None,
            resolution: None,
            released: None,
            successor: None,
            portable: None,
        }
    }
}

/// Authorizes and applies commands to agent trust records
pub struct LifecycleStateMachine {
    config: ProtocolConfig,
    collaborators: Collaborators,
    aggregator: ValidationAggregator,
    monitor: CollateralMonitor,
    router: FeeRouter,
    migrations: MigrationManager,
}

impl LifecycleStateMachine {
    pub fn new(config: ProtocolConfig, collaborators: Collaborators) -> BondResult<Self> {
        Self::with_scorer(config, collaborators, Arc::new(RunningMeanScorer))
    }

    pub fn with_scorer(
        config: ProtocolConfig,
        collaborators: Collaborators,
        scorer: Arc<dyn ScoringStrategy>,
    ) -> BondResult<Self> {
        config.validate()?;
        info!(
            protocol_version = config.protocol_version,
            required_bond = config.required_bond.0,
            ratio_bps = config.min_collateral_ratio_bps,
            scorer = scorer.name(),
            "Lifecycle state machine configured"
        );
        Ok(Self {
            aggregator: ValidationAggregator::new(scorer, config.min_validator_stake),
            monitor: CollateralMonitor::new(config.required_bond, config.min_collateral_ratio_bps),
            router: FeeRouter::new(config.treasury.clone()),
            migrations: MigrationManager::new(config.protocol_version),
            collaborators,
            config,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn monitor(&self) -> &CollateralMonitor {
        &self.monitor
    }

    pub fn router(&self) -> &FeeRouter {
        &self.router
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.collaborators.now()
    }

    /// A fresh `Uninitialized` record under this deployment's defaults.
    pub fn new_record(
        &self,
        asset_id: AssetId,
        authority: Identity,
        owner: Identity,
    ) -> AgentTrustRecord {
        AgentTrustRecord::new(asset_id, authority, owner, &self.config, self.now())
    }

    /// Apply one command to `record`.
    ///
    /// On error the draft may be partially modified and must be discarded.
    pub async fn execute(
        &self,
        record: &mut AgentTrustRecord,
        envelope: &CommandEnvelope,
    ) -> BondResult<CommandOutcome> {
        let kind = envelope.command.kind();
        let caller = &envelope.caller;

        if record.state.is_terminal() {
            return Err(BondError::RecordTerminal {
                asset_id: record.asset_id.clone(),
                state: record.state,
            });
        }

        // Whoever holds the asset now is the owner.
        if let Some(holder) = self.collaborators.assets.holder(&record.asset_id).await? {
            if holder != record.owner {
                info!(asset = %record.asset_id, from = %record.owner, to = %holder, "Owner follows asset transfer");
                record.owner = holder;
            }
        }

        self.authorize(record, caller, kind)?;

        if kind == CommandKind::Activate
            && record.state == AgentState::Active
            && record.registration_fee_paid
        {
            debug!(asset = %record.asset_id, "Activation replay ignored");
            let mut outcome = CommandOutcome::start(record, kind);
            outcome.noop = true;
            return Ok(outcome);
        }
        if kind == CommandKind::OpenDispute && record.has_open_dispute() {
            return Err(BondError::AlreadyChallenged(record.asset_id.clone()));
        }
        if kind == CommandKind::ResolveDispute && record.state != AgentState::Challenged {
            if let Some(dispute) = record.dispute.as_ref().filter(|d| !d.is_open()) {
                return Err(BondError::DisputeAlreadyResolved(
                    dispute.dispute_id.to_string(),
                ));
            }
        }
        if !record.state.permits(kind) {
            warn!(asset = %record.asset_id, state = %record.state, command = %kind, "Illegal transition");
            return Err(BondError::invalid_transition(record.state, kind));
        }

        let now = self.now();
        record.last_transfer_timestamp = self
            .collaborators
            .assets
            .last_transfer(&record.asset_id)
            .await?;

        let mut outcome = CommandOutcome::start(record, kind);
        let burns_asset = self
            .apply(record, caller, &envelope.command, now, &mut outcome)
            .await?;

        if record.state != outcome.previous_state {
            outcome.events.push(LifecycleEvent::StateChanged {
                command: kind,
                from: outcome.previous_state,
                to: record.state,
            });
        }

        let before_monitor = record.state;
        if let Some(breach) = self.monitor.evaluate(record) {
            outcome.events.push(LifecycleEvent::CollateralFrozen {
                bond: breach.bond,
                tvm: breach.tvm,
                floor: breach.floor,
            });
            outcome.events.push(LifecycleEvent::StateChanged {
                command: CommandKind::CheckCollateral,
                from: before_monitor,
                to: record.state,
            });
        }
        if let Some(successor) = outcome.successor.as_mut() {
            self.monitor.evaluate(successor);
        }

        if burns_asset {
            outcome.events.push(LifecycleEvent::AssetBurned);
            outcome.asset_effect = Some(AssetEffect::Burn);
        } else {
            outcome.asset_effect = Some(AssetEffect::for_state(record.state));
        }

        record.revision += 1;
        record.updated_at = now;
        outcome.state = record.state;
        outcome.bond = record.bond_amount();

        info!(
            asset = %record.asset_id,
            command = %kind,
            caller = %caller,
            from = %outcome.previous_state,
            to = %record.state,
            bond = record.bond_amount().0,
            revision = record.revision,
            "Command applied"
        );
        Ok(outcome)
    }

    fn authorize(
        &self,
        record: &AgentTrustRecord,
        caller: &Identity,
        kind: CommandKind,
    ) -> BondResult<()> {
        use CommandKind as C;

        let is_authority = caller == &record.authority;
        let allowed = match kind {
            C::Activate
            | C::RequestUnbond
            | C::CancelUnbond
            | C::FinalizeUnbond
            | C::WithdrawExcess
            | C::SetValidatorWhitelist
            | C::SetConsensusPolicy
            | C::TransferAuthority
            | C::AnchorHistory
            | C::Migrate
            | C::SovereignExit
            | C::Burn => is_authority,
            C::TopUp => is_authority || caller == &record.owner,
            // an authority cannot stage a dispute against its own agent
            C::OpenDispute => !is_authority,
            C::ResolveDispute | C::ReportTvm | C::UpdateFeeConfig => {
                caller == &self.config.governance
            }
            C::SubmitAttestation | C::CheckCollateral => true,
        };

        if allowed {
            Ok(())
        } else {
            warn!(asset = %record.asset_id, caller = %caller, command = %kind, "Unauthorized command");
            Err(BondError::unauthorized(caller, kind))
        }
    }

    /// Dispatch to the owning component. Returns whether the asset burns.
    async fn apply(
        &self,
        record: &mut AgentTrustRecord,
        caller: &Identity,
        command: &Command,
        now: DateTime<Utc>,
        outcome: &mut CommandOutcome,
    ) -> BondResult<bool> {
        match command {
            Command::Activate { bond_amount, fee } => {
                self.activate(record, *bond_amount, *fee, outcome)?;
            }

            Command::SubmitAttestation { receipt } => {
                let result = self
                    .aggregator
                    .ingest(
                        record,
                        receipt,
                        self.collaborators.attestations.as_ref(),
                        &self.router,
                        now,
                    )
                    .await?;
                if let AttestationOutcome::Committed {
                    digest,
                    score,
                    commitment,
                    tax,
                } = &result
                {
                    outcome.events.push(LifecycleEvent::ClaimCommitted {
                        digest: *digest,
                        score: *score,
                        epoch: commitment.epoch,
                    });
                    if !tax.is_zero() {
                        outcome.events.push(LifecycleEvent::FeeCollected {
                            kind: FeeKind::ValidationTax,
                            amount: *tax,
                        });
                    }
                }
                outcome.attestation = Some(result);
            }

            Command::OpenDispute { evidence } => {
                let dispute_id = DisputeResolver::open(record, caller, evidence.clone(), now)?;
                outcome.events.push(LifecycleEvent::DisputeOpened {
                    dispute_id,
                    challenger: caller.clone(),
                });
            }

            Command::ResolveDispute { verdict } => {
                let resolution = DisputeResolver::resolve(record, *verdict, &self.router, now)?;
                let dispute_id = record
                    .dispute
                    .as_ref()
                    .map(|d| d.dispute_id.clone())
                    .unwrap_or_else(|| DisputeId::new("unknown"));
                outcome.events.push(LifecycleEvent::DisputeResolved {
                    dispute_id,
                    verdict: *verdict,
                    seized: resolution.seized,
                    vigorish: resolution.split.map(|s| s.vigorish).unwrap_or_default(),
                    remainder: resolution.split.map(|s| s.remainder).unwrap_or_default(),
                    destination: resolution.split.map(|s| s.destination),
                });
                let burns = DisputeResolver::burns_asset(&resolution);
                outcome.resolution = Some(resolution);
                return Ok(burns);
            }

            Command::RequestUnbond => {
                let deadline = now + self.config.grace_period();
                record.unbonding_deadline = Some(deadline);
                record.state = AgentState::Unbonding;
                info!(asset = %record.asset_id, deadline = %deadline, "Unbond requested");
            }

            Command::CancelUnbond => {
                record.unbonding_deadline = None;
                record.state = AgentState::Active;
            }

            Command::FinalizeUnbond => {
                if record.unbonding_deadline.is_none() {
                    return Err(BondError::invalid_transition(
                        record.state,
                        CommandKind::FinalizeUnbond,
                    ));
                }
                record.ensure_grace_elapsed(now)?;
                let released = record.bond.release_all();
                record.unbonding_deadline = None;
                record.state = AgentState::Thawed;
                outcome.released = Some(released);
                outcome
                    .events
                    .push(LifecycleEvent::BondReleased { amount: released });
            }

            Command::TopUp { amount } => {
                let balance = record.bond.fund(*amount);
                outcome.events.push(LifecycleEvent::BondFunded {
                    amount: *amount,
                    balance,
                });
                if record.state == AgentState::Frozen {
                    if self.monitor.is_undercollateralized(balance, record.tvm) {
                        debug!(
                            asset = %record.asset_id,
                            balance = balance.0,
                            tvm = record.tvm.0,
                            "Top-up short of collateral ratio, agent stays frozen"
                        );
                    } else {
                        record.state = AgentState::Active;
                    }
                }
            }

            Command::WithdrawExcess { amount } => {
                let bond = record.bond_amount();
                if *amount > bond {
                    return Err(BondError::InsufficientBond {
                        required: *amount,
                        available: bond,
                    });
                }
                let remaining = bond.saturating_sub(*amount);
                let floor = self.monitor.floor(record.tvm);
                if remaining < floor {
                    return Err(BondError::CollateralBelowMinimum {
                        bond: remaining,
                        floor,
                    });
                }
                let balance = record.bond.withdraw(*amount, record.state)?;
                outcome.released = Some(*amount);
                outcome.events.push(LifecycleEvent::BondWithdrawn {
                    amount: *amount,
                    balance,
                });
            }

            Command::ReportTvm { tvm } => {
                record.tvm = *tvm;
                outcome
                    .events
                    .push(LifecycleEvent::TvmReported { tvm: *tvm });
            }

            Command::CheckCollateral => {}

            Command::UpdateFeeConfig { fees } => {
                fees.validate()?;
                record.fee_config = fees.clone();
                outcome
                    .events
                    .push(LifecycleEvent::FeeConfigUpdated { fees: fees.clone() });
            }

            Command::SetValidatorWhitelist { whitelist } => {
                record.validator_whitelist = whitelist.clone();
                outcome.events.push(LifecycleEvent::WhitelistUpdated {
                    validators: whitelist.as_ref().map(|set| set.len()),
                });
            }

            Command::SetConsensusPolicy { policy } => {
                policy.validate()?;
                record.consensus = policy.clone();
                outcome
                    .events
                    .push(LifecycleEvent::ConsensusPolicyUpdated {
                        policy: policy.clone(),
                    });
            }

            Command::TransferAuthority { new_authority } => {
                if new_authority.as_str().trim().is_empty() {
                    return Err(BondError::InvalidConfig(
                        "authority identity must be non-empty".into(),
                    ));
                }
                let previous = std::mem::replace(&mut record.authority, new_authority.clone());
                info!(asset = %record.asset_id, from = %previous, to = %new_authority, "Authority transferred");
                outcome.events.push(LifecycleEvent::AuthorityTransferred {
                    from: previous,
                    to: new_authority.clone(),
                });
            }

            Command::AnchorHistory { blob } => {
                let epoch = record.validation.commitment.epoch;
                if record
                    .history_pointer
                    .as_ref()
                    .is_some_and(|pointer| pointer.epoch == epoch)
                {
                    return Err(BondError::HistoryEpochSealed { epoch });
                }
                let reference = self.collaborators.archive.store(blob).await?;
                record.history_pointer = Some(HistoryPointer {
                    reference: reference.clone(),
                    epoch,
                    anchored_at: now,
                });
                outcome
                    .events
                    .push(LifecycleEvent::HistoryAnchored { reference, epoch });
            }

            Command::Migrate {
                target_asset_id,
                protocol_version,
            } => {
                let successor = self.migrations.migrate(
                    record,
                    target_asset_id.clone(),
                    *protocol_version,
                    now,
                )?;
                outcome.events.push(LifecycleEvent::MigratedTo {
                    target: target_asset_id.clone(),
                    protocol_version: *protocol_version,
                });
                outcome.successor = Some(successor);
            }

            Command::SovereignExit => {
                let portable = MigrationManager::sovereign_exit(record, now)?;
                outcome.events.push(LifecycleEvent::SovereignExit {
                    digest: portable.digest,
                });
                outcome.released = Some(portable.bond);
                outcome.portable = Some(portable);
                return Ok(true);
            }

            Command::Burn => {
                let released = record.bond.release_all();
                if !released.is_zero() {
                    outcome
                        .events
                        .push(LifecycleEvent::BondReleased { amount: released });
                }
                outcome.released = Some(released);
                record.unbonding_deadline = None;
                record.state = AgentState::Dead;
                info!(asset = %record.asset_id, refunded = released.0, "Agent burned");
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn activate(
        &self,
        record: &mut AgentTrustRecord,
        bond_amount: Amount,
        fee: Amount,
        outcome: &mut CommandOutcome,
    ) -> BondResult<()> {
        if !record.registration_fee_paid {
            let required = record.fee_config.registration_fee;
            if fee < required {
                return Err(BondError::InsufficientFee {
                    required,
                    offered: fee,
                });
            }
            // The router only ever credits the configured fee.
            if fee > required {
                return Err(BondError::ExcessFee {
                    required,
                    offered: fee,
                });
            }
            let collected = self
                .router
                .collect_registration(&record.fee_config, &mut record.fees);
            record.registration_fee_paid = true;
            outcome.events.push(LifecycleEvent::FeeCollected {
                kind: FeeKind::Registration,
                amount: collected,
            });
        }

        if !bond_amount.is_zero() {
            let balance = record.bond.fund(bond_amount);
            outcome.events.push(LifecycleEvent::BondFunded {
                amount: bond_amount,
                balance,
            });
        }

        let required = self.config.required_bond;
        if record.bond_amount() >= required {
            record.state = AgentState::Active;
        } else {
            record.state = AgentState::PendingBond;
            debug!(
                asset = %record.asset_id,
                bond = record.bond_amount().0,
                required = required.0,
                "Bond short of requirement, pending"
            );
        }
        Ok(())
    }
}
