//! Service configuration, loaded from an optional TOML file

use crate::ServiceError;
use bond_runtime::{DecayingScorer, RunningMeanScorer, ScoringStrategy};
use bond_types::{Amount, Identity, ProtocolConfig};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub protocol: ProtocolConfig,
    pub scoring: ScoringConfig,
    pub storage: StorageConfig,
    /// Skip signature checks; stakes still apply. Local runs only.
    pub accept_unsigned_receipts: bool,
    pub validators: Vec<ValidatorEntry>,
    /// Reject commands from callers without a registered key
    pub require_signed_commands: bool,
    /// Identities whose commands must carry a valid signature
    pub callers: Vec<CallerEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    RunningMean,
    Decaying,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub strategy: ScorerKind,
    /// Weight of the newest claim for the decaying scorer
    pub decay_weight_bps: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            strategy: ScorerKind::RunningMean,
            decay_weight_bps: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON state file; in-memory when unset
    pub state_file: Option<PathBuf>,
}

/// A validator known to this deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub id: Identity,
    /// Hex-encoded Ed25519 public key
    #[serde(default)]
    pub public_key: Option<String>,
    pub stake: Amount,
}

/// A caller that signs its command envelopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerEntry {
    pub id: Identity,
    /// Hex-encoded Ed25519 public key
    pub public_key: String,
}

impl ServiceConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ServiceError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ServiceError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        self.protocol.validate()?;
        if !self.accept_unsigned_receipts {
            if let Some(entry) = self.validators.iter().find(|v| v.public_key.is_none()) {
                return Err(ServiceError::Config(format!(
                    "validator {} has no public_key and unsigned receipts are not accepted",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    pub fn scorer(&self) -> Arc<dyn ScoringStrategy> {
        match self.scoring.strategy {
            ScorerKind::RunningMean => Arc::new(RunningMeanScorer),
            ScorerKind::Decaying => Arc::new(DecayingScorer::new(self.scoring.decay_weight_bps)),
        }
    }
}
