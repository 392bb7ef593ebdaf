//! Validation receipts submitted by validators

use crate::{Amount, AssetId, Digest32, Identity, ReceiptId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest normalized trust score.
pub const MAX_SCORE: u8 = 100;

/// What a validator claims about one unit of agent behavior.
///
/// Two receipts agree when their payloads are byte-for-byte equivalent
/// under canonical JSON, i.e. when their `digest()` values match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomePayload {
    /// Task or interaction the claim is about
    pub task_ref: String,
    /// Normalized outcome score, 0..=100
    pub score: u8,
    /// Value of the task, basis for the validation tax
    pub task_value: Amount,
}

impl OutcomePayload {
    pub fn new(task_ref: impl Into<String>, score: u8, task_value: Amount) -> Self {
        Self {
            task_ref: task_ref.into(),
            score,
            task_value,
        }
    }

    /// Content digest used to group equivalent claims.
    pub fn digest(&self) -> Digest32 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        Digest32::hash(&bytes)
    }
}

/// A validator-signed attestation about an agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReceipt {
    pub receipt_id: ReceiptId,
    pub validator: Identity,
    pub asset_id: AssetId,
    pub payload: OutcomePayload,
    pub issued_at: DateTime<Utc>,
    /// Hex-encoded signature over `signing_message()`
    #[serde(default)]
    pub signature: String,
}

impl ValidationReceipt {
    pub fn new(validator: Identity, asset_id: AssetId, payload: OutcomePayload) -> Self {
        Self {
            receipt_id: ReceiptId::generate(),
            validator,
            asset_id,
            payload,
            issued_at: Utc::now(),
            signature: String::new(),
        }
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    pub fn with_signature(mut self, signature_hex: impl Into<String>) -> Self {
        self.signature = signature_hex.into();
        self
    }

    /// The bytes a validator signs: `blake3(json(validator, asset, payload, issued_at))`.
    ///
    /// The receipt id is excluded so a resubmitted claim cannot dodge
    /// deduplication by minting a fresh id.
    pub fn signing_message(&self) -> Digest32 {
        let material = serde_json::json!({
            "validator": self.validator,
            "asset_id": self.asset_id,
            "payload": self.payload,
            "issued_at": self.issued_at,
        });
        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        Digest32::hash(&bytes)
    }

    /// Structural checks that need no external collaborator.
    pub fn is_well_formed(&self) -> bool {
        !self.validator.0.trim().is_empty()
            && !self.payload.task_ref.trim().is_empty()
            && self.payload.score <= MAX_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(score: u8) -> OutcomePayload {
        OutcomePayload::new("task-1", score, Amount::new(1_000))
    }

    #[test]
    fn test_equivalent_payloads_share_digest() {
        assert_eq!(payload(90).digest(), payload(90).digest());
        assert_ne!(payload(90).digest(), payload(40).digest());
    }

    #[test]
    fn test_signing_message_ignores_receipt_id() {
        let issued = Utc::now();
        let a = ValidationReceipt::new(Identity::new("v1"), AssetId::new("a"), payload(90))
            .with_issued_at(issued);
        let b = ValidationReceipt::new(Identity::new("v1"), AssetId::new("a"), payload(90))
            .with_issued_at(issued);
        assert_ne!(a.receipt_id, b.receipt_id);
        assert_eq!(a.signing_message(), b.signing_message());
    }

    #[test]
    fn test_well_formed() {
        let ok = ValidationReceipt::new(Identity::new("v1"), AssetId::new("a"), payload(100));
        assert!(ok.is_well_formed());

        let bad_score = ValidationReceipt::new(Identity::new("v1"), AssetId::new("a"), payload(101));
        assert!(!bad_score.is_well_formed());

        let anonymous = ValidationReceipt::new(Identity::new(" "), AssetId::new("a"), payload(50));
        assert!(!anonymous.is_well_formed());
    }
}
