// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Ed25519 signing helpers for update packages.
// Author: Lukas Bower

//! Signing capability for the configuration entry.
//!
//! Keys live in hex files: a 32-byte Ed25519 seed for signing and a
//! 32-byte verifying key for the verify-only path. The cryptography
//! itself is opaque to the rest of the tool.

use std::fs;
use std::path::Path;

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use signature::{Signer, Verifier};

use crate::error::{CryptoError, Error};

/// Length of a detached signature entry in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Length of the raw key material in bytes.
pub const KEY_LEN: usize = 32;

fn read_key_bytes(path: &Path) -> Result<[u8; KEY_LEN], Error> {
    let contents = fs::read(path)?;
    let text = std::str::from_utf8(&contents)
        .map_err(|_| CryptoError::BadKey(format!("{} is not utf-8", path.display())))?;
    let raw = hex::decode(text.trim())
        .map_err(|err| CryptoError::BadKey(format!("{} must be hex: {err}", path.display())))?;
    let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
        CryptoError::BadKey(format!(
            "{} must be {KEY_LEN} bytes (got {})",
            path.display(),
            raw.len()
        ))
    })?;
    Ok(bytes)
}

/// Load an Ed25519 signing key from a hex seed file.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, Error> {
    Ok(SigningKey::from_bytes(&read_key_bytes(path)?))
}

/// Load an Ed25519 verifying key from a hex file.
pub fn load_verifying_key(path: &Path) -> Result<VerifyingKey, Error> {
    let bytes = read_key_bytes(path)?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|err| CryptoError::BadKey(format!("{}: {err}", path.display())).into())
}

/// Sign configuration bytes, returning the detached signature entry.
#[must_use]
pub fn sign_config(key: &SigningKey, config_text: &[u8]) -> [u8; SIGNATURE_LEN] {
    let signature: Signature = key.sign(config_text);
    signature.to_bytes()
}

/// Verify a detached signature entry against configuration bytes.
pub fn verify_config(
    key: &VerifyingKey,
    config_text: &[u8],
    signature_bytes: &[u8],
) -> Result<(), Error> {
    let raw: [u8; SIGNATURE_LEN] =
        signature_bytes
            .try_into()
            .map_err(|_| CryptoError::SignatureLength {
                expected: SIGNATURE_LEN,
                got: signature_bytes.len() as u64,
            })?;
    let signature = Signature::from_bytes(&raw);
    key.verify(config_text, &signature)
        .map_err(|_| CryptoError::BadSignature.into())
}

/// Generate a fresh keypair, writing `<prefix>.priv` and `<prefix>.pub`
/// hex files.
pub fn generate_keypair(prefix: &Path) -> Result<(), Error> {
    let mut rng = rand::rngs::OsRng;
    let signing_key = SigningKey::generate(&mut rng);
    let private_path = prefix.with_extension("priv");
    let public_path = prefix.with_extension("pub");
    fs::write(&private_path, hex::encode(signing_key.to_bytes()))?;
    fs::write(&public_path, hex::encode(signing_key.verifying_key().to_bytes()))?;
    Ok(())
}
