//! Collateral monitor
//!
//! Runs after every successful state-changing command. An `Active` or
//! `Unbonding` record whose bond falls under `tvm * ratio` is forced into
//! `Frozen`, whatever transition the caller asked for.

use crate::record::AgentTrustRecord;
use bond_types::{AgentState, Amount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A forced freeze applied by the monitor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralBreach {
    pub bond: Amount,
    pub tvm: Amount,
    pub floor: Amount,
    pub previous_state: AgentState,
}

#[derive(Clone, Copy, Debug)]
pub struct CollateralMonitor {
    required_bond: Amount,
    min_ratio_bps: u32,
}

impl CollateralMonitor {
    pub fn new(required_bond: Amount, min_ratio_bps: u32) -> Self {
        Self {
            required_bond,
            min_ratio_bps,
        }
    }

    /// `bond * 10_000 < tvm * ratio_bps`, compared without rounding.
    pub fn is_undercollateralized(&self, bond: Amount, tvm: Amount) -> bool {
        (bond.0 as u128) * (BPS_DENOMINATOR as u128) < (tvm.0 as u128) * (self.min_ratio_bps as u128)
    }

    /// Bond that must remain after an excess withdrawal:
    /// `max(required_bond, ceil(tvm * ratio_bps / 10_000))`.
    ///
    /// Leaving `Frozen` only needs the ratio, see `is_undercollateralized`.
    pub fn floor(&self, tvm: Amount) -> Amount {
        self.required_bond.max(tvm.apply_bps_ceil(self.min_ratio_bps))
    }

    /// Force `Frozen` on a monitored record that breaches the ratio.
    pub fn evaluate(&self, record: &mut AgentTrustRecord) -> Option<CollateralBreach> {
        if !record.state.is_monitored() {
            return None;
        }
        let bond = record.bond_amount();
        if !self.is_undercollateralized(bond, record.tvm) {
            return None;
        }

        let breach = CollateralBreach {
            bond,
            tvm: record.tvm,
            floor: self.floor(record.tvm),
            previous_state: record.state,
        };
        warn!(
            asset = %record.asset_id,
            bond = bond.0,
            tvm = record.tvm.0,
            ratio_bps = self.min_ratio_bps,
            previous_state = %record.state,
            "Collateral below minimum, freezing agent"
        );
        record.state = AgentState::Frozen;
        record.unbonding_deadline = None;
        Some(breach)
    }
}
