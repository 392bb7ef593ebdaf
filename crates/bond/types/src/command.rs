//! Commands accepted by the lifecycle state machine

use crate::{
    Amount, AssetId, ConsensusPolicy, Digest32, DisputeVerdict, FeeConfig, Identity,
    ValidationReceipt,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Discriminant of a `Command`, used by the legality table and in errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Activate,
    SubmitAttestation,
    OpenDispute,
    ResolveDispute,
    RequestUnbond,
    CancelUnbond,
    FinalizeUnbond,
    TopUp,
    WithdrawExcess,
    ReportTvm,
    CheckCollateral,
    UpdateFeeConfig,
    SetValidatorWhitelist,
    SetConsensusPolicy,
    TransferAuthority,
    AnchorHistory,
    Migrate,
    SovereignExit,
    Burn,
}

impl CommandKind {
    pub const ALL: [CommandKind; 19] = [
        Self::Activate,
        Self::SubmitAttestation,
        Self::OpenDispute,
        Self::ResolveDispute,
        Self::RequestUnbond,
        Self::CancelUnbond,
        Self::FinalizeUnbond,
        Self::TopUp,
        Self::WithdrawExcess,
        Self::ReportTvm,
        Self::CheckCollateral,
        Self::UpdateFeeConfig,
        Self::SetValidatorWhitelist,
        Self::SetConsensusPolicy,
        Self::TransferAuthority,
        Self::AnchorHistory,
        Self::Migrate,
        Self::SovereignExit,
        Self::Burn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::SubmitAttestation => "submit_attestation",
            Self::OpenDispute => "open_dispute",
            Self::ResolveDispute => "resolve_dispute",
            Self::RequestUnbond => "request_unbond",
            Self::CancelUnbond => "cancel_unbond",
            Self::FinalizeUnbond => "finalize_unbond",
            Self::TopUp => "top_up",
            Self::WithdrawExcess => "withdraw_excess",
            Self::ReportTvm => "report_tvm",
            Self::CheckCollateral => "check_collateral",
            Self::UpdateFeeConfig => "update_fee_config",
            Self::SetValidatorWhitelist => "set_validator_whitelist",
            Self::SetConsensusPolicy => "set_consensus_policy",
            Self::TransferAuthority => "transfer_authority",
            Self::AnchorHistory => "anchor_history",
            Self::Migrate => "migrate",
            Self::SovereignExit => "sovereign_exit",
            Self::Burn => "burn",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An external action against one agent record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Activate {
        bond_amount: Amount,
        fee: Amount,
    },
    SubmitAttestation {
        receipt: ValidationReceipt,
    },
    OpenDispute {
        evidence: String,
    },
    ResolveDispute {
        verdict: DisputeVerdict,
    },
    RequestUnbond,
    CancelUnbond,
    FinalizeUnbond,
    TopUp {
        amount: Amount,
    },
    WithdrawExcess {
        amount: Amount,
    },
    ReportTvm {
        tvm: Amount,
    },
    CheckCollateral,
    UpdateFeeConfig {
        fees: FeeConfig,
    },
    SetValidatorWhitelist {
        whitelist: Option<BTreeSet<Identity>>,
    },
    SetConsensusPolicy {
        policy: ConsensusPolicy,
    },
    TransferAuthority {
        new_authority: Identity,
    },
    AnchorHistory {
        blob: Vec<u8>,
    },
    Migrate {
        target_asset_id: AssetId,
        protocol_version: u32,
    },
    SovereignExit,
    Burn,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Activate { .. } => CommandKind::Activate,
            Self::SubmitAttestation { .. } => CommandKind::SubmitAttestation,
            Self::OpenDispute { .. } => CommandKind::OpenDispute,
            Self::ResolveDispute { .. } => CommandKind::ResolveDispute,
            Self::RequestUnbond => CommandKind::RequestUnbond,
            Self::CancelUnbond => CommandKind::CancelUnbond,
            Self::FinalizeUnbond => CommandKind::FinalizeUnbond,
            Self::TopUp { .. } => CommandKind::TopUp,
            Self::WithdrawExcess { .. } => CommandKind::WithdrawExcess,
            Self::ReportTvm { .. } => CommandKind::ReportTvm,
            Self::CheckCollateral => CommandKind::CheckCollateral,
            Self::UpdateFeeConfig { .. } => CommandKind::UpdateFeeConfig,
            Self::SetValidatorWhitelist { .. } => CommandKind::SetValidatorWhitelist,
            Self::SetConsensusPolicy { .. } => CommandKind::SetConsensusPolicy,
            Self::TransferAuthority { .. } => CommandKind::TransferAuthority,
            Self::AnchorHistory { .. } => CommandKind::AnchorHistory,
            Self::Migrate { .. } => CommandKind::Migrate,
            Self::SovereignExit => CommandKind::SovereignExit,
            Self::Burn => CommandKind::Burn,
        }
    }
}

/// A command together with the identity issuing it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub caller: Identity,
    pub command: Command,
}

impl CommandEnvelope {
    pub fn new(caller: Identity, command: Command) -> Self {
        Self { caller, command }
    }

    /// Digest a caller signs to prove it issued this command for `asset_id`.
    pub fn signing_message(&self, asset_id: &AssetId, issued_at: DateTime<Utc>) -> Digest32 {
        let material = serde_json::json!({
            "asset_id": asset_id,
            "caller": self.caller,
            "command": self.command,
            "issued_at": issued_at,
        });
        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        Digest32::hash(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlashingSeverity;

    #[test]
    fn test_kind_names_are_unique() {
        let names: BTreeSet<&str> = CommandKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), CommandKind::ALL.len());
    }

    #[test]
    fn test_command_json_shape() {
        let envelope: CommandEnvelope = serde_json::from_value(serde_json::json!({
            "caller": "gov",
            "command": {
                "type": "resolve_dispute",
                "verdict": { "verdict": "slash", "severity": "minor" }
            }
        }))
        .unwrap();
        assert_eq!(envelope.caller, Identity::new("gov"));
        assert_eq!(
            envelope.command,
            Command::ResolveDispute {
                verdict: DisputeVerdict::Slash(SlashingSeverity::Minor)
            }
        );
        assert_eq!(envelope.command.kind(), CommandKind::ResolveDispute);
    }

    #[test]
    fn test_signing_message_binds_asset_and_command() {
        let at = Utc::now();
        let envelope = CommandEnvelope::new(Identity::new("gov"), Command::CheckCollateral);
        let base = envelope.signing_message(&AssetId::new("nft-1"), at);
        assert_eq!(base, envelope.signing_message(&AssetId::new("nft-1"), at));
        assert_ne!(base, envelope.signing_message(&AssetId::new("nft-2"), at));
        assert_ne!(
            base,
            envelope.signing_message(&AssetId::new("nft-1"), at + chrono::Duration::seconds(1))
        );
        let other = CommandEnvelope::new(Identity::new("gov"), Command::RequestUnbond);
        assert_ne!(base, other.signing_message(&AssetId::new("nft-1"), at));
    }

    #[test]
    fn test_unit_command_json() {
        let cmd: Command = serde_json::from_str(r#"{"type":"finalize_unbond"}"#).unwrap();
        assert_eq!(cmd, Command::FinalizeUnbond);
    }
}
