//! Receipt verification against registered validator keys

use async_trait::async_trait;
use bond_runtime::{AttestationVerifier, CollaboratorError};
use bond_types::{Amount, Identity, ValidationReceipt};
use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tracing::{debug, info};

const NAME: &str = "attestation_verifier";

/// Sign `receipt` with `key`, returning it with a hex signature attached.
pub fn sign_receipt(key: &SigningKey, receipt: ValidationReceipt) -> ValidationReceipt {
    let signature = key.sign(receipt.signing_message().as_bytes());
    let hex = hex_encode(signature.to_bytes().as_slice());
    receipt.with_signature(hex)
}

/// Checks Ed25519 signatures over [`ValidationReceipt::signing_message`]
/// and reports the stake each validator has bonded.
#[derive(Debug, Default)]
pub struct Ed25519ReceiptVerifier {
    keys: DashMap<Identity, VerifyingKey>,
    stakes: DashMap<Identity, Amount>,
}

impl Ed25519ReceiptVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, validator: Identity, key: VerifyingKey, stake: Amount) {
        info!(validator = %validator, stake = stake.0, "Validator registered");
        self.keys.insert(validator.clone(), key);
        self.stakes.insert(validator, stake);
    }

    /// Register from a hex-encoded 32-byte public key.
    pub fn register_hex(
        &self,
        validator: Identity,
        public_key_hex: &str,
        stake: Amount,
    ) -> Result<(), CollaboratorError> {
        let rejected = |message: &str| CollaboratorError::Rejected {
            collaborator: NAME,
            message: format!("{}: {}", validator, message),
        };
        let bytes = hex_decode(public_key_hex).map_err(|_| rejected("public key is not hex"))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| rejected("public key must be 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| rejected("invalid public key"))?;
        self.register(validator, key, stake);
        Ok(())
    }

    pub fn set_stake(&self, validator: &Identity, stake: Amount) {
        self.stakes.insert(validator.clone(), stake);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl AttestationVerifier for Ed25519ReceiptVerifier {
    async fn verify_receipt(&self, receipt: &ValidationReceipt) -> Result<bool, CollaboratorError> {
        let Some(key) = self.keys.get(&receipt.validator).map(|k| *k.value()) else {
            debug!(validator = %receipt.validator, "No key registered for validator");
            return Ok(false);
        };
        let Ok(sig_bytes) = hex_decode(&receipt.signature) else {
            return Ok(false);
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return Ok(false);
        };
        let signature = Signature::from_bytes(&sig_bytes);
        Ok(key
            .verify(receipt.signing_message().as_bytes(), &signature)
            .is_ok())
    }

    async fn validator_stake(&self, validator: &Identity) -> Result<Amount, CollaboratorError> {
        Ok(self
            .stakes
            .get(validator)
            .map(|s| *s.value())
            .unwrap_or_default())
    }
}

/// Accepts every signature; stake still comes from its table.
///
/// For local runs where validators do not sign receipts.
#[derive(Debug, Default)]
pub struct PermissiveVerifier {
    stakes: DashMap<Identity, Amount>,
}

impl PermissiveVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stake(self, validator: Identity, stake: Amount) -> Self {
        self.stakes.insert(validator, stake);
        self
    }
}

#[async_trait]
impl AttestationVerifier for PermissiveVerifier {
    async fn verify_receipt(&self, _receipt: &ValidationReceipt) -> Result<bool, CollaboratorError> {
        Ok(true)
    }

    async fn validator_stake(&self, validator: &Identity) -> Result<Amount, CollaboratorError> {
        Ok(self
            .stakes
            .get(validator)
            .map(|s| *s.value())
            .unwrap_or_default())
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bond_types::{AssetId, OutcomePayload};

    fn receipt(validator: &str) -> ValidationReceipt {
        ValidationReceipt::new(
            Identity::new(validator),
            AssetId::new("nft-1"),
            OutcomePayload::new("task-1", 90, Amount::new(1_000)),
        )
    }

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[tokio::test]
    async fn accepts_signature_from_registered_key() {
        let verifier = Ed25519ReceiptVerifier::new();
        let signer = key(7);
        verifier.register(Identity::new("v1"), signer.verifying_key(), Amount::new(500));

        let signed = sign_receipt(&signer, receipt("v1"));
        assert!(verifier.verify_receipt(&signed).await.unwrap());
        assert_eq!(
            verifier.validator_stake(&Identity::new("v1")).await.unwrap(),
            Amount::new(500)
        );
    }

    #[tokio::test]
    async fn rejects_wrong_key_and_tampering() {
        let verifier = Ed25519ReceiptVerifier::new();
        verifier.register(Identity::new("v1"), key(7).verifying_key(), Amount::new(500));

        let forged = sign_receipt(&key(8), receipt("v1"));
        assert!(!verifier.verify_receipt(&forged).await.unwrap());

        let mut tampered = sign_receipt(&key(7), receipt("v1"));
        tampered.payload.score = 10;
        assert!(!verifier.verify_receipt(&tampered).await.unwrap());

        let unsigned = receipt("v1");
        assert!(!verifier.verify_receipt(&unsigned).await.unwrap());

        let unknown = sign_receipt(&key(9), receipt("v9"));
        assert!(!verifier.verify_receipt(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn registers_hex_keys() {
        let verifier = Ed25519ReceiptVerifier::new();
        let signer = key(3);
        let hex = hex_encode(signer.verifying_key().as_bytes());
        verifier
            .register_hex(Identity::new("v1"), &hex, Amount::new(100))
            .unwrap();
        assert_eq!(verifier.len(), 1);
        assert!(verifier
            .register_hex(Identity::new("v2"), "abcd", Amount::new(100))
            .is_err());
        assert!(verifier
            .register_hex(Identity::new("v3"), "zz", Amount::new(100))
            .is_err());
    }

    #[test]
    fn hex_round_trip() {
        assert_eq!(hex_decode(&hex_encode(&[0, 255, 16])).unwrap(), vec![0, 255, 16]);
        assert!(hex_decode("abc").is_err());
    }
}
