//! Caller keys for signed command envelopes

use crate::attestation::{hex_decode, hex_encode};
use bond_runtime::CollaboratorError;
use bond_types::{AssetId, CommandEnvelope, Identity};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tracing::{debug, info};

const NAME: &str = "caller_keys";

/// Sign `envelope` for `asset_id`, returning the hex signature.
pub fn sign_command(
    key: &SigningKey,
    asset_id: &AssetId,
    envelope: &CommandEnvelope,
    issued_at: DateTime<Utc>,
) -> String {
    let message = envelope.signing_message(asset_id, issued_at);
    hex_encode(key.sign(message.as_bytes()).to_bytes().as_slice())
}

/// Ed25519 keys of identities that must sign the commands they issue
#[derive(Debug, Default)]
pub struct CallerKeys {
    keys: DashMap<Identity, VerifyingKey>,
}

impl CallerKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, caller: Identity, key: VerifyingKey) {
        info!(caller = %caller, "Caller key registered");
        self.keys.insert(caller, key);
    }

    /// Register from a hex-encoded 32-byte public key.
    pub fn register_hex(&self, caller: Identity, public_key_hex: &str) -> Result<(), CollaboratorError> {
        let rejected = |message: &str| CollaboratorError::Rejected {
            collaborator: NAME,
            message: format!("{}: {}", caller, message),
        };
        let bytes = hex_decode(public_key_hex).map_err(|_| rejected("public key is not hex"))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| rejected("public key must be 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| rejected("invalid public key"))?;
        self.register(caller, key);
        Ok(())
    }

    pub fn is_registered(&self, caller: &Identity) -> bool {
        self.keys.contains_key(caller)
    }

    /// Whether `signature_hex` is the registered key's signature over the envelope.
    pub fn verify(
        &self,
        asset_id: &AssetId,
        envelope: &CommandEnvelope,
        issued_at: DateTime<Utc>,
        signature_hex: &str,
    ) -> bool {
        let Some(key) = self.keys.get(&envelope.caller).map(|k| *k.value()) else {
            debug!(caller = %envelope.caller, "No key registered for caller");
            return false;
        };
        let Ok(bytes) = hex_decode(signature_hex) else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
            return false;
        };
        let message = envelope.signing_message(asset_id, issued_at);
        key.verify(message.as_bytes(), &Signature::from_bytes(&bytes))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
