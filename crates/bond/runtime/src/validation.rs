//! Validation aggregator: receipt eligibility and M-of-N consensus
//!
//! Receipts are grouped by the digest of their outcome payload. A claim
//! commits once `required` distinct qualifying validators have agreed on it
//! within the consensus window, measured from the claim's first receipt.
//! Only committed claims reach the scorer and the reputation commitment;
//! raw receipts are never stored beyond the pending tally.
//!
//! Committed digests are remembered for one window after commit. Receipts
//! issued before the window are rejected, so an expired digest cannot be
//! committed again by replaying its old receipts.

use crate::collaborators::AttestationVerifier;
use crate::fees::FeeRouter;
use crate::record::AgentTrustRecord;
use crate::scoring::ScoringStrategy;
use bond_types::{
    Amount, BondError, BondResult, Digest32, Identity, OutcomePayload, ReputationCommitment,
    ValidationReceipt,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A claim still collecting agreeing validators
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingClaim {
    pub payload: OutcomePayload,
    pub first_seen: DateTime<Utc>,
    pub validators: BTreeSet<Identity>,
}

/// Per-agent validation state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationBook {
    pub commitment: ReputationCommitment,
    /// Normalized trust score, 0..=100
    pub score: u8,
    pub committed_claims: u64,
    /// Receipts that counted toward a committed claim
    pub accepted_receipts: u64,
    pub pending: BTreeMap<Digest32, PendingClaim>,
    /// Recently committed claims, stamped with their commit time
    #[serde(default)]
    pub committed: BTreeMap<Digest32, DateTime<Utc>>,
}

/// What happened to a submitted receipt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttestationOutcome {
    /// The receipt completed the quorum; score and commitment advanced
    Committed {
        digest: Digest32,
        score: u8,
        commitment: ReputationCommitment,
        tax: Amount,
    },
    /// Counted, but the quorum is not reached yet
    Pending {
        digest: Digest32,
        current: u32,
        required: u32,
    },
    /// This validator already agreed on this claim; not counted again
    Duplicate {
        digest: Digest32,
        current: u32,
        required: u32,
    },
    /// The claim was committed earlier
    AlreadyCommitted { digest: Digest32 },
}

/// Filters receipts and drives the consensus tally
#[derive(Clone)]
pub struct ValidationAggregator {
    scorer: Arc<dyn ScoringStrategy>,
    min_validator_stake: Amount,
}

impl ValidationAggregator {
    pub fn new(scorer: Arc<dyn ScoringStrategy>, min_validator_stake: Amount) -> Self {
        Self {
            scorer,
            min_validator_stake,
        }
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Reject receipts that must never count.
    pub async fn check_eligibility(
        &self,
        record: &AgentTrustRecord,
        receipt: &ValidationReceipt,
        verifier: &dyn AttestationVerifier,
    ) -> BondResult<()> {
        if !receipt.is_well_formed() {
            return Err(BondError::InvalidAttestation(format!(
                "receipt {} is malformed",
                receipt.receipt_id
            )));
        }
        if receipt.asset_id != record.asset_id {
            return Err(BondError::InvalidAttestation(format!(
                "receipt targets {} but was submitted to {}",
                receipt.asset_id, record.asset_id
            )));
        }
        if !record.is_whitelisted(&receipt.validator) {
            warn!(validator = %receipt.validator, asset = %record.asset_id, "Validator not whitelisted");
            return Err(BondError::ValidatorNotEligible {
                validator: receipt.validator.clone(),
                reason: "not in validator whitelist".into(),
            });
        }

        let stake = verifier.validator_stake(&receipt.validator).await?;
        if stake < self.min_validator_stake {
            warn!(
                validator = %receipt.validator,
                stake = stake.0,
                minimum = self.min_validator_stake.0,
                "Validator stake below minimum"
            );
            return Err(BondError::ValidatorNotEligible {
                validator: receipt.validator.clone(),
                reason: format!(
                    "stake {} below minimum {}",
                    stake, self.min_validator_stake
                ),
            });
        }

        if !verifier.verify_receipt(receipt).await? {
            warn!(validator = %receipt.validator, receipt = %receipt.receipt_id, "Receipt verification failed");
            return Err(BondError::InvalidAttestation(format!(
                "signature on receipt {} failed verification",
                receipt.receipt_id
            )));
        }
        Ok(())
    }

    /// Count an eligible receipt toward its claim, committing it on quorum.
    pub fn tally(
        &self,
        record: &mut AgentTrustRecord,
        receipt: &ValidationReceipt,
        router: &FeeRouter,
        now: DateTime<Utc>,
    ) -> AttestationOutcome {
        let required = record.consensus.required;
        let window = record.consensus.window();
        let book = &mut record.validation;

        book.pending.retain(|digest, claim| {
            let live = claim.first_seen + window >= now;
            if !live {
                debug!(claim = %digest, "Consensus window expired, dropping claim");
            }
            live
        });
        book.committed
            .retain(|_, committed_at| *committed_at + window >= now);

        let digest = receipt.payload.digest();
        if book.committed.contains_key(&digest) {
            return AttestationOutcome::AlreadyCommitted { digest };
        }

        let claim = book.pending.entry(digest).or_insert_with(|| PendingClaim {
            payload: receipt.payload.clone(),
            first_seen: now,
            validators: BTreeSet::new(),
        });

        if !claim.validators.insert(receipt.validator.clone()) {
            debug!(claim = %digest, validator = %receipt.validator, "Duplicate receipt ignored");
            return AttestationOutcome::Duplicate {
                digest,
                current: claim.validators.len() as u32,
                required,
            };
        }

        let current = claim.validators.len() as u32;
        if current < required {
            debug!(claim = %digest, current, required, "Claim pending consensus");
            return AttestationOutcome::Pending {
                digest,
                current,
                required,
            };
        }

        let Some(claim) = book.pending.remove(&digest) else {
            return AttestationOutcome::AlreadyCommitted { digest };
        };
        book.score = self
            .scorer
            .next_score(book.score, book.committed_claims, claim.payload.score);
        book.committed_claims += 1;
        book.accepted_receipts += claim.validators.len() as u64;
        book.commitment = book.commitment.advance(&digest);
        book.committed.insert(digest, now);

        let tax = router.charge_validation_tax(
            &record.fee_config,
            claim.payload.task_value,
            &mut record.fees,
        );

        info!(
            asset = %record.asset_id,
            claim = %digest,
            validators = current,
            score = record.validation.score,
            epoch = record.validation.commitment.epoch,
            "Claim committed"
        );

        AttestationOutcome::Committed {
            digest,
            score: record.validation.score,
            commitment: record.validation.commitment,
            tax,
        }
    }

    pub async fn ingest(
        &self,
        record: &mut AgentTrustRecord,
        receipt: &ValidationReceipt,
        verifier: &dyn AttestationVerifier,
        router: &FeeRouter,
        now: DateTime<Utc>,
    ) -> BondResult<AttestationOutcome> {
        self.check_eligibility(record, receipt, verifier).await?;
        if receipt.issued_at + record.consensus.window() < now {
            warn!(validator = %receipt.validator, receipt = %receipt.receipt_id, "Stale receipt");
            return Err(BondError::InvalidAttestation(format!(
                "receipt {} was issued before the consensus window",
                receipt.receipt_id
            )));
        }
        Ok(self.tally(record, receipt, router, now))
    }

    /// Commitment after a claim's quorum, or `ThresholdNotMet` while it is
    /// still short of agreeing validators.
    pub fn consensus_status(
        record: &AgentTrustRecord,
        digest: &Digest32,
    ) -> BondResult<ReputationCommitment> {
        let book = &record.validation;
        if book.committed.contains_key(digest) {
            return Ok(book.commitment);
        }
        let current = book
            .pending
            .get(digest)
            .map(|claim| claim.validators.len() as u32)
            .unwrap_or(0);
        Err(BondError::ThresholdNotMet {
            required: record.consensus.required,
            current,
        })
    }
}
