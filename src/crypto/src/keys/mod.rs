//! Loading identity key material from disk

use crate::error::{CryptoError, Result};
use crate::identity::Identity;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::SigningKey;
use std::path::Path;
use tracing::debug;

const PEM_MARKER: &str = "-----BEGIN";

/// Load an identity from a private key file and a certificate file.
///
/// The key may be a PKCS#8 PEM encoded Ed25519 key or a raw 32-byte seed.
/// The certificate is carried verbatim as the identity's id bytes.
pub fn load_identity(mspid: &str, private_key: &Path, sign_cert: &Path) -> Result<Identity> {
    let key_bytes = read(private_key)?;
    let signing_key = parse_signing_key(&key_bytes)?;
    let certificate = read(sign_cert)?;

    debug!(
        "Loaded identity for {} (key: {:?}, cert: {} bytes)",
        mspid,
        private_key,
        certificate.len()
    );

    Identity::new(mspid, certificate, signing_key)
}

/// Decode a signing key from PEM (PKCS#8) or a raw seed
pub fn parse_signing_key(bytes: &[u8]) -> Result<SigningKey> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        if text.trim_start().starts_with(PEM_MARKER) {
            return SigningKey::from_pkcs8_pem(text)
                .map_err(|e| CryptoError::InvalidKey(format!("PKCS#8 PEM: {}", e)));
        }
    }

    let seed: [u8; 32] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "expected PKCS#8 PEM or a 32-byte seed, got {} bytes",
            bytes.len()
        ))
    })?;
    Ok(SigningKey::from_bytes(&seed))
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| CryptoError::KeyLoad {
        path: path.display().to_string(),
        source,
    })
}
