//! Dispute resolver: challenge, verdict, and slashing
//!
//! A record carries at most one open dispute. Seizure happens exactly once,
//! when the dispute resolves; a resolved dispute cannot be resolved again.

use crate::fees::{FeeRouter, SeizureSplit};
use crate::record::AgentTrustRecord;
use bond_types::{
    AgentState, Amount, BondError, BondResult, CommandKind, DisputeId, DisputeVerdict, Identity,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// How a dispute ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    pub verdict: DisputeVerdict,
    pub seized: Amount,
    pub split: Option<SeizureSplit>,
    pub resulting_state: AgentState,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub dispute_id: DisputeId,
    pub challenger: Identity,
    pub evidence: String,
    pub opened_at: DateTime<Utc>,
    /// State to return to if the dispute is dismissed
    pub prior_state: AgentState,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
}

impl DisputeRecord {
    pub fn is_open(&self) -> bool {
        self.status == DisputeStatus::Open
    }
}

/// Applies the dispute flow to a draft record
pub struct DisputeResolver;

impl DisputeResolver {
    /// Open a dispute and move the record to `Challenged`.
    pub fn open(
        record: &mut AgentTrustRecord,
        challenger: &Identity,
        evidence: String,
        now: DateTime<Utc>,
    ) -> BondResult<DisputeId> {
        if record.has_open_dispute() {
            warn!(asset = %record.asset_id, challenger = %challenger, "Dispute already open");
            return Err(BondError::AlreadyChallenged(record.asset_id.clone()));
        }

        let dispute = DisputeRecord {
            dispute_id: DisputeId::generate(),
            challenger: challenger.clone(),
            evidence,
            opened_at: now,
            prior_state: record.state,
            status: DisputeStatus::Open,
            resolution: None,
        };
        let id = dispute.dispute_id.clone();

        info!(
            asset = %record.asset_id,
            dispute = %id,
            challenger = %challenger,
            prior_state = %record.state,
            "Dispute opened"
        );

        record.dispute = Some(dispute);
        record.state = AgentState::Challenged;
        Ok(id)
    }

    /// Resolve the open dispute. Slashing seizes `penalty_bps` of the
    /// current bond and routes it through the fee router.
    pub fn resolve(
        record: &mut AgentTrustRecord,
        verdict: DisputeVerdict,
        router: &FeeRouter,
        now: DateTime<Utc>,
    ) -> BondResult<DisputeResolution> {
        let (dispute_id, prior_state) = match record.dispute.as_ref() {
            Some(dispute) if dispute.is_open() => {
                (dispute.dispute_id.clone(), dispute.prior_state)
            }
            Some(dispute) => {
                return Err(BondError::DisputeAlreadyResolved(
                    dispute.dispute_id.to_string(),
                ))
            }
            None => {
                return Err(BondError::invalid_transition(
                    record.state,
                    CommandKind::ResolveDispute,
                ))
            }
        };

        let resolution = match verdict {
            DisputeVerdict::Dismissed => DisputeResolution {
                verdict,
                seized: Amount::zero(),
                split: None,
                resulting_state: prior_state,
                resolved_at: now,
            },
            DisputeVerdict::Slash(severity) => {
                let seized = record.bond.seize(severity.penalty_bps());
                let split = router.route_seizure(&record.fee_config, seized, &mut record.fees);
                DisputeResolution {
                    verdict,
                    seized,
                    split: Some(split),
                    resulting_state: severity.resulting_state(),
                    resolved_at: now,
                }
            }
        };

        record.state = resolution.resulting_state;
        if resolution.resulting_state != AgentState::Unbonding {
            record.unbonding_deadline = None;
        }
        if let Some(dispute) = record.dispute.as_mut() {
            dispute.status = DisputeStatus::Resolved;
            dispute.resolution = Some(resolution.clone());
        }

        match verdict {
            DisputeVerdict::Slash(severity) => info!(
                asset = %record.asset_id,
                dispute = %dispute_id,
                severity = %severity,
                seized = resolution.seized.0,
                remaining = record.bond_amount().0,
                state = %record.state,
                "Dispute upheld, bond slashed"
            ),
            DisputeVerdict::Dismissed => info!(
                asset = %record.asset_id,
                dispute = %dispute_id,
                state = %record.state,
                "Dispute dismissed"
            ),
        }

        Ok(resolution)
    }

    pub fn burns_asset(resolution: &DisputeResolution) -> bool {
        matches!(resolution.verdict, DisputeVerdict::Slash(s) if s.burns_asset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::active_record;
    use bond_types::SlashingSeverity;

    fn router() -> FeeRouter {
        FeeRouter::new(Identity::new("treasury"))
    }

    fn challenged() -> AgentTrustRecord {
        let mut record = active_record();
        DisputeResolver::open(&mut record, &Identity::new("c"), "ev".into(), Utc::now()).unwrap();
        record
    }

    #[test]
    fn test_second_open_fails() {
        let mut record = challenged();
        let err = DisputeResolver::open(&mut record, &Identity::new("c2"), "ev".into(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, BondError::AlreadyChallenged(_)));
    }

    #[test]
    fn test_slash_outcomes_from_1000() {
        let cases = [
            (SlashingSeverity::Minor, 900, AgentState::Active),
            (SlashingSeverity::Major, 500, AgentState::Frozen),
            (SlashingSeverity::Critical, 0, AgentState::Dead),
        ];
        for (severity, remaining, state) in cases {
            let mut record = challenged();
            let resolution = DisputeResolver::resolve(
                &mut record,
                DisputeVerdict::Slash(severity),
                &router(),
                Utc::now(),
            )
            .unwrap();
            assert_eq!(record.bond_amount(), Amount::new(remaining));
            assert_eq!(record.state, state);
            assert_eq!(resolution.seized, Amount::new(1000 - remaining));
            assert_eq!(
                DisputeResolver::burns_asset(&resolution),
                severity == SlashingSeverity::Critical
            );
        }
    }

    #[test]
    fn test_dismissal_restores_prior_state() {
        let mut record = active_record();
        record.state = AgentState::Unbonding;
        record.unbonding_deadline = Some(Utc::now());
        DisputeResolver::open(&mut record, &Identity::new("c"), "ev".into(), Utc::now()).unwrap();
        DisputeResolver::resolve(&mut record, DisputeVerdict::Dismissed, &router(), Utc::now())
            .unwrap();
        assert_eq!(record.state, AgentState::Unbonding);
        assert!(record.unbonding_deadline.is_some());
        assert_eq!(record.bond_amount(), Amount::new(1000));
    }

    #[test]
    fn test_resolve_twice_fails() {
        let mut record = challenged();
        let verdict = DisputeVerdict::Slash(SlashingSeverity::Minor);
        DisputeResolver::resolve(&mut record, verdict, &router(), Utc::now()).unwrap();
        let err = DisputeResolver::resolve(&mut record, verdict, &router(), Utc::now()).unwrap_err();
        assert!(matches!(err, BondError::DisputeAlreadyResolved(_)));
        assert_eq!(record.bond_amount(), Amount::new(900));
    }

    #[test]
    fn test_seized_funds_never_return_to_agent() {
        let mut record = challenged();
        DisputeResolver::resolve(
            &mut record,
            DisputeVerdict::Slash(SlashingSeverity::Major),
            &router(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.fees.vigorish, Amount::new(50));
        assert_eq!(record.fees.burned, Amount::new(450));
        assert_eq!(
            record.bond_amount().saturating_add(record.fees.vigorish).saturating_add(record.fees.burned),
            Amount::new(1000)
        );
    }
}
