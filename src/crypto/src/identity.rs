//! Submitter signing identity
//!
//! An [`Identity`] pairs a membership service provider id and a certificate
//! with the Ed25519 key that signs on its behalf. The serialized form is what
//! peers see as the `creator` of a proposal, so it is computed once and reused
//! for every header the pipeline builds.

use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability to identify and sign as a ledger client.
///
/// Implementations must be safe to call from many pipeline workers at once.
pub trait Signer: Send + Sync {
    /// Serialized identity bytes placed in message headers
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Sign a message
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Wire form of an identity: MSP id plus the certificate bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedIdentity {
    pub mspid: String,
    pub id_bytes: Vec<u8>,
}

impl SerializedIdentity {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| CryptoError::Deserialization(e.to_string()))
    }
}

/// Ed25519-backed signing identity
pub struct Identity {
    mspid: String,
    certificate: Vec<u8>,
    signing_key: SigningKey,
    serialized: Vec<u8>,
}

impl Identity {
    /// Create an identity from already loaded key material
    pub fn new(mspid: impl Into<String>, certificate: Vec<u8>, signing_key: SigningKey) -> Result<Self> {
        let mspid = mspid.into();
        let serialized = SerializedIdentity {
            mspid: mspid.clone(),
            id_bytes: certificate.clone(),
        }
        .to_bytes()?;

        Ok(Self {
            mspid,
            certificate,
            signing_key,
            serialized,
        })
    }

    /// Generate a fresh identity whose certificate is its raw public key.
    ///
    /// Used by the mock network and tests; real runs load key material with
    /// [`crate::keys::load_identity`].
    pub fn generate(mspid: impl Into<String>) -> Result<Self> {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let certificate = signing_key.verifying_key().to_bytes().to_vec();
        Self::new(mspid, certificate, signing_key)
    }

    pub fn mspid(&self) -> &str {
        &self.mspid
    }

    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Public key bytes usable with [`verify`]
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }
}

impl Signer for Identity {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.serialized.clone())
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| CryptoError::SignatureGeneration(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("mspid", &self.mspid)
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature against a raw 32-byte public key
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature =
        Signature::from_slice(signature).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    Ok(key.verify(message, &signature).is_ok())
}
