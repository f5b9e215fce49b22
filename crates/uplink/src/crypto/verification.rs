//! Ed25519 signature verification.
//!
//! Verification is a pure predicate: anything malformed is simply `false`.
//! Callers never learn why a signature was rejected, and neither does the
//! remote peer.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use super::challenge::Challenge;

/// Verify a hex signature over `challenge` against a hex public key
pub fn verify(challenge: &Challenge<'_>, public_key_hex: &str, signature_hex: &str) -> bool {
    verify_bytes(challenge.message().as_bytes(), public_key_hex, signature_hex)
}

/// Verify a hex signature over raw bytes against a hex public key
pub fn verify_bytes(data: &[u8], public_key_hex: &str, signature_hex: &str) -> bool {
    let Some(verifying_key) = decode_public_key(public_key_hex) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_arr) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_arr);

    verifying_key.verify(data, &signature).is_ok()
}

/// Decode a hex public key, `None` if it is not a valid Ed25519 point
pub fn decode_public_key(public_key_hex: &str) -> Option<VerifyingKey> {
    let bytes = hex::decode(public_key_hex).ok()?;
    let arr = <[u8; 32]>::try_from(bytes.as_slice()).ok()?;
    VerifyingKey::from_bytes(&arr).ok()
}
