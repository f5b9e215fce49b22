//! Detached Ed25519 signing over challenge strings.

use ed25519_dalek::Signer;

use super::challenge::Challenge;
use super::keys::KeyPair;

/// Sign a challenge and return the 64-byte signature as hex
pub fn sign(challenge: &Challenge<'_>, keypair: &KeyPair) -> String {
    sign_bytes(challenge.message().as_bytes(), keypair)
}

/// Sign raw bytes and return the signature as hex
pub fn sign_bytes(data: &[u8], keypair: &KeyPair) -> String {
    hex::encode(keypair.signing_key.sign(data).to_bytes())
}
