//! Fee routing
//!
//! Pure accounting. Every amount routed to the treasury is added to a
//! saturating counter and never dropped.

use bond_types::{Amount, FeeConfig, Identity, SlashRemainder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Category of a routed fee
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    Registration,
    ValidationTax,
    Vigorish,
}

/// Cumulative fee counters for one agent
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAccount {
    pub registration: Amount,
    pub validation_tax: Amount,
    pub vigorish: Amount,
    /// Seized remainder removed from circulation
    pub burned: Amount,
    /// Seized remainder credited to the insurance pool
    pub insurance: Amount,
}

impl FeeAccount {
    /// Everything routed to the treasury.
    pub fn treasury_total(&self) -> Amount {
        self.registration
            .saturating_add(self.validation_tax)
            .saturating_add(self.vigorish)
    }

    /// Sum two accounts counter by counter.
    pub fn merged(&self, other: &FeeAccount) -> FeeAccount {
        FeeAccount {
            registration: self.registration.saturating_add(other.registration),
            validation_tax: self.validation_tax.saturating_add(other.validation_tax),
            vigorish: self.vigorish.saturating_add(other.vigorish),
            burned: self.burned.saturating_add(other.burned),
            insurance: self.insurance.saturating_add(other.insurance),
        }
    }
}

/// How a seized amount was divided
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeizureSplit {
    pub vigorish: Amount,
    pub remainder: Amount,
    pub destination: SlashRemainder,
}

/// Computes fees and routes them to a single treasury identity
#[derive(Clone, Debug)]
pub struct FeeRouter {
    treasury: Identity,
}

impl FeeRouter {
    pub fn new(treasury: Identity) -> Self {
        Self { treasury }
    }

    pub fn treasury(&self) -> &Identity {
        &self.treasury
    }

    /// Collect the fixed registration fee.
    pub fn collect_registration(&self, config: &FeeConfig, account: &mut FeeAccount) -> Amount {
        let fee = config.registration_fee;
        account.registration = account.registration.saturating_add(fee);
        debug!(treasury = %self.treasury, amount = fee.0, "Registration fee routed");
        fee
    }

    /// `floor(task_value * validation_tax_bps / 10_000)`
    pub fn validation_tax(config: &FeeConfig, task_value: Amount) -> Amount {
        task_value.apply_bps(config.validation_tax_bps)
    }

    /// Charge the validation tax for one committed task.
    pub fn charge_validation_tax(
        &self,
        config: &FeeConfig,
        task_value: Amount,
        account: &mut FeeAccount,
    ) -> Amount {
        let tax = Self::validation_tax(config, task_value);
        account.validation_tax = account.validation_tax.saturating_add(tax);
        debug!(treasury = %self.treasury, task_value = task_value.0, tax = tax.0, "Validation tax routed");
        tax
    }

    /// Split a seized amount: the vigorish goes to the treasury, the
    /// remainder is burned or sent to the insurance pool.
    pub fn route_seizure(
        &self,
        config: &FeeConfig,
        seized: Amount,
        account: &mut FeeAccount,
    ) -> SeizureSplit {
        let vigorish = seized.apply_bps(config.vigorish_bps);
        let remainder = seized.saturating_sub(vigorish);
        account.vigorish = account.vigorish.saturating_add(vigorish);
        match config.slash_remainder {
            SlashRemainder::Burn => account.burned = account.burned.saturating_add(remainder),
            SlashRemainder::InsurancePool => {
                account.insurance = account.insurance.saturating_add(remainder)
            }
        }
        debug!(
            treasury = %self.treasury,
            seized = seized.0,
            vigorish = vigorish.0,
            remainder = remainder.0,
            "Seizure routed"
        );
        SeizureSplit {
            vigorish,
            remainder,
            destination: config.slash_remainder,
        }
    }
}
