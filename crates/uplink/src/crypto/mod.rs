//! Attestation primitives shared by hub and validator.
//!
//! - Ed25519 key loading and generation
//! - Purpose-bound challenge strings
//! - Detached signing and never-failing verification

pub mod challenge;
pub mod keys;
pub mod signing;
pub mod verification;

pub use challenge::Challenge;
pub use keys::{generate_keypair, load_keypair, parse_secret_key, save_keypair, KeyPair};
pub use signing::sign;
pub use verification::verify;
