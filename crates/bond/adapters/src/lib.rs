//! Collaborator adapters for the Agent Bond runtime.
//!
//! In-process implementations of the asset ledger, archive, and
//! attestation ports, plus the caller keys used to check signed commands.
//! The service binary wires these by default; a deployment against real
//! infrastructure replaces them.

#![deny(unsafe_code)]

pub mod archive;
pub mod assets;
pub mod attestation;
pub mod callers;

pub use archive::InMemoryArchive;
pub use assets::InMemoryAssetLedger;
pub use attestation::{sign_receipt, Ed25519ReceiptVerifier, PermissiveVerifier};
pub use callers::{sign_command, CallerKeys};
