//! Escrow ledger holding an agent's bond
//!
//! The bond balance is only ever changed through the operations below.
//! Callers apply them to a draft record, so a failed command never leaves a
//! partially moved balance behind.

use bond_types::{
    AgentState, Amount, AssetId, BondError, BondResult, CommandKind, Denomination,
    EscrowAccountRef,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bond balance, denomination, and the escrow account that holds it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowLedger {
    amount: Amount,
    pub denomination: Denomination,
    pub account: EscrowAccountRef,
}

impl EscrowLedger {
    pub fn new(asset_id: &AssetId, denomination: Denomination) -> Self {
        Self {
            amount: Amount::zero(),
            denomination,
            account: EscrowAccountRef::for_asset(asset_id),
        }
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Add funds to the bond. Always legal before the record is terminal.
    pub fn fund(&mut self, amount: Amount) -> Amount {
        self.amount = self.amount.saturating_add(amount);
        debug!(account = %self.account, amount = amount.0, balance = self.amount.0, "Bond funded");
        self.amount
    }

    /// Take funds out of escrow.
    ///
    /// Only a `Thawed` record, or an `Active` record through the
    /// authority-approved excess path, may withdraw.
    pub fn withdraw(&mut self, amount: Amount, state: AgentState) -> BondResult<Amount> {
        if !(state.permits_withdrawal() || state == AgentState::Active) {
            return Err(BondError::invalid_transition(
                state,
                CommandKind::WithdrawExcess,
            ));
        }
        if amount > self.amount {
            return Err(BondError::InsufficientBond {
                required: amount,
                available: self.amount,
            });
        }
        self.amount = self.amount.saturating_sub(amount);
        debug!(account = %self.account, amount = amount.0, balance = self.amount.0, "Bond withdrawn");
        Ok(self.amount)
    }

    /// Seize `floor(balance * bps / 10_000)`, returning the seized amount.
    pub fn seize(&mut self, bps: u32) -> Amount {
        let seized = self.amount.apply_bps(bps);
        self.amount = self.amount.saturating_sub(seized);
        debug!(account = %self.account, bps, seized = seized.0, balance = self.amount.0, "Bond seized");
        seized
    }

    /// Drain the whole balance, returning what left escrow.
    pub fn release_all(&mut self) -> Amount {
        let released = self.amount;
        self.amount = Amount::zero();
        released
    }
}
