//! Pluggable trust-score strategies
//!
//! The aggregator guarantees input integrity; how a committed claim moves the
//! score is up to the strategy.

use bond_types::{BPS_DENOMINATOR, MAX_SCORE};

/// Folds one committed claim's score into the running trust score
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `committed` is the number of claims already folded into `current`.
    fn next_score(&self, current: u8, committed: u64, observed: u8) -> u8;
}

/// Count-weighted arithmetic mean over every committed claim
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningMeanScorer;

impl ScoringStrategy for RunningMeanScorer {
    fn name(&self) -> &'static str {
        "running_mean"
    }

    fn next_score(&self, current: u8, committed: u64, observed: u8) -> u8 {
        let observed = observed.min(MAX_SCORE) as u128;
        let total = (current as u128) * (committed as u128) + observed;
        let count = committed as u128 + 1;
        // round half up
        ((total * 2 + count) / (count * 2)).min(MAX_SCORE as u128) as u8
    }
}

/// Exponentially weighted score; recent claims count for `weight_bps`
#[derive(Clone, Copy, Debug)]
pub struct DecayingScorer {
    pub weight_bps: u32,
}

impl DecayingScorer {
    pub fn new(weight_bps: u32) -> Self {
        Self {
            weight_bps: weight_bps.min(BPS_DENOMINATOR),
        }
    }
}

impl Default for DecayingScorer {
    fn default() -> Self {
        Self::new(2_000)
    }
}

impl ScoringStrategy for DecayingScorer {
    fn name(&self) -> &'static str {
        "decaying"
    }

    fn next_score(&self, current: u8, committed: u64, observed: u8) -> u8 {
        let observed = observed.min(MAX_SCORE) as u64;
        if committed == 0 {
            return observed as u8;
        }
        let weight = self.weight_bps.min(BPS_DENOMINATOR) as u64;
        let keep = BPS_DENOMINATOR as u64 - weight;
        let blended = (current as u64 * keep + observed * weight + BPS_DENOMINATOR as u64 / 2)
            / BPS_DENOMINATOR as u64;
        blended.min(MAX_SCORE as u64) as u8
    }
}
