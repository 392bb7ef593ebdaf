//! Slashing severity and dispute verdicts

use crate::AgentState;
use serde::{Deserialize, Serialize};

/// How hard a dispute resolved against the agent is punished
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashingSeverity {
    Minor,
    Major,
    Critical,
}

impl SlashingSeverity {
    /// Share of the current bond seized, in basis points.
    pub fn penalty_bps(self) -> u32 {
        match self {
            Self::Minor => 1_000,
            Self::Major => 5_000,
            Self::Critical => 10_000,
        }
    }

    /// State the agent lands in after the slash is applied.
    pub fn resulting_state(self) -> AgentState {
        match self {
            Self::Minor => AgentState::Active,
            Self::Major => AgentState::Frozen,
            Self::Critical => AgentState::Dead,
        }
    }

    /// Whether the asset itself is burned.
    pub fn burns_asset(self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl std::fmt::Display for SlashingSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a dispute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "severity", rename_all = "snake_case")]
pub enum DisputeVerdict {
    /// Resolved in the agent's favor; no penalty
    Dismissed,
    /// Upheld; the bond is slashed at the given severity
    Slash(SlashingSeverity),
}

/// Where the non-vigorish part of a seized bond goes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlashRemainder {
    /// Removed from circulation
    #[default]
    Burn,
    /// Credited to the protocol insurance pool
    InsurancePool,
}
