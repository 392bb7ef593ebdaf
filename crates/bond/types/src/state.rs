//! Agent lifecycle states and the legality table
//!
//! `AgentState::permits` is the single place that decides which command
//! kinds are legal in which state. Every (state, command) pair has an
//! answer; there is no fallthrough.

use crate::CommandKind;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an agent trust record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Registered, nothing funded yet
    #[default]
    Uninitialized,
    /// Activation requested, bond below the required amount
    PendingBond,
    /// Fully bonded and usable
    Active,
    /// A dispute is open against the agent
    Challenged,
    /// Bond is below the collateral floor or was majorly slashed
    Frozen,
    /// Unbond requested; waiting out the grace period
    Unbonding,
    /// Bond returned; the asset is freely transferable
    Thawed,
    /// Destroyed by critical slashing, burn, or sovereign exit
    Dead,
    /// Superseded by a record under a newer protocol version
    Migrated,
}

impl AgentState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::PendingBond => "pending_bond",
            Self::Active => "active",
            Self::Challenged => "challenged",
            Self::Frozen => "frozen",
            Self::Unbonding => "unbonding",
            Self::Thawed => "thawed",
            Self::Dead => "dead",
            Self::Migrated => "migrated",
        }
    }

    /// Terminal records accept no further commands.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dead | Self::Migrated)
    }

    /// States the collateral monitor may force into `Frozen`.
    pub fn is_monitored(self) -> bool {
        matches!(self, Self::Active | Self::Unbonding)
    }

    /// Whether the underlying asset should be frozen at the asset layer.
    pub fn asset_frozen(self) -> bool {
        !matches!(self, Self::Active | Self::Thawed)
    }

    /// Whether bond may leave escrow without an authority-approved path.
    pub fn permits_withdrawal(self) -> bool {
        matches!(self, Self::Thawed)
    }

    /// The legality table.
    pub fn permits(self, command: CommandKind) -> bool {
        use AgentState as S;
        use CommandKind as C;

        if self.is_terminal() {
            return false;
        }

        match command {
            C::Activate => matches!(self, S::Uninitialized | S::PendingBond),
            C::SubmitAttestation => matches!(self, S::Active | S::Challenged | S::Unbonding),
            C::OpenDispute => matches!(self, S::Active | S::Unbonding),
            C::ResolveDispute => matches!(self, S::Challenged),
            C::RequestUnbond => matches!(self, S::Active),
            C::CancelUnbond => matches!(self, S::Unbonding),
            C::FinalizeUnbond => matches!(self, S::Unbonding),
            C::TopUp => matches!(
                self,
                S::Frozen | S::Active | S::Challenged | S::Unbonding
            ),
            C::WithdrawExcess => matches!(self, S::Active),
            C::Burn => matches!(self, S::Uninitialized | S::PendingBond | S::Thawed),
            // Bonded states leave through the unbonding grace period first.
            C::SovereignExit => matches!(
                self,
                S::Uninitialized | S::PendingBond | S::Unbonding | S::Thawed
            ),
            // Administrative and monitoring commands are legal in every
            // non-terminal state.
            C::ReportTvm
            | C::CheckCollateral
            | C::UpdateFeeConfig
            | C::SetValidatorWhitelist
            | C::SetConsensusPolicy
            | C::TransferAuthority
            | C::AnchorHistory
            | C::Migrate => true,
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
