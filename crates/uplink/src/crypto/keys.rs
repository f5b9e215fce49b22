//! Ed25519 key material for validators.
//!
//! Validators receive their signing key out of band. The core only ever
//! loads keys; `generate_keypair` exists for the `keygen` tooling and tests.

use anyhow::{bail, Context, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;

/// KeyPair for signing and verification
#[derive(Clone)]
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Create a new keypair from a signing key
    pub fn new(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    /// Get the public key as bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the public key as hex string, the form used on the wire and in storage
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Generate a new Ed25519 keypair
pub fn generate_keypair() -> KeyPair {
    let mut secret_bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut OsRng, &mut secret_bytes);
    KeyPair::new(SigningKey::from_bytes(&secret_bytes))
}

/// Parse a 32-byte secret key given either as raw bytes or as hex text.
///
/// Surrounding whitespace in hex text (a trailing newline from `echo`) is
/// ignored.
pub fn parse_secret_key(raw: &[u8]) -> Result<KeyPair> {
    let bytes: Vec<u8> = if raw.len() == 32 {
        raw.to_vec()
    } else {
        let text = std::str::from_utf8(raw).context("Secret key is neither 32 raw bytes nor text")?;
        hex::decode(text.trim()).context("Secret key is not valid hex")?
    };

    let Ok(secret) = <[u8; 32]>::try_from(bytes.as_slice()) else {
        bail!("Invalid secret key: expected 32 bytes, got {}", bytes.len());
    };

    Ok(KeyPair::new(SigningKey::from_bytes(&secret)))
}

/// Save a keypair's secret to a file as hex text
pub fn save_keypair(keypair: &KeyPair, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, hex::encode(keypair.signing_key.to_bytes()))
        .context("Failed to write keypair to file")?;

    tracing::info!("Saved keypair to: {}", path.display());
    Ok(())
}

/// Load a keypair from a file holding raw or hex-encoded secret bytes
pub fn load_keypair(path: &Path) -> Result<KeyPair> {
    let raw = fs::read(path)
        .with_context(|| format!("Failed to read keypair file {}", path.display()))?;
    parse_secret_key(&raw).with_context(|| format!("Invalid keypair file {}", path.display()))
}
