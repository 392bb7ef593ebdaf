//! Agent Bond Domain Types
//!
//! This crate defines the vocabulary shared by the bond runtime, its
//! adapters, and the service surface: a bondable agent identity attached
//! one-to-one to a digital asset.
//!
//! # Key Concepts
//!
//! - **Bond**: funds escrowed against an agent's future misbehavior.
//! - **Attestation receipt**: a validator-signed claim about an agent's
//!   behavior, aggregated into a trust score under M-of-N consensus.
//! - **Slashing**: graduated seizure of the bond when a dispute resolves
//!   against the agent.
//! - **Reputation commitment**: a forward-only blake3 chain summarizing
//!   accepted validation history without storing the receipts themselves.
//!
//! # Architecture
//!
//! This is a pure types crate with no runtime dependencies. IDs use the
//! newtype pattern and implement `Display` and `new()`.

#![deny(unsafe_code)]

mod amount;
mod command;
mod config;
mod digest;
mod error;
mod ids;
mod receipt;
mod severity;
mod state;

pub use amount::*;
pub use command::*;
pub use config::*;
pub use digest::*;
pub use error::*;
pub use ids::*;
pub use receipt::*;
pub use severity::*;
pub use state::*;
