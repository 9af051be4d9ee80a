//! Error types for the cryptography module

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signature generation failed
    #[error("Signature generation failed: {0}")]
    SignatureGeneration(String),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid signature format
    #[error("Invalid signature format: {0}")]
    InvalidSignature(String),

    /// Key material could not be read
    #[error("Failed to load {path}: {source}")]
    KeyLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Identity serialization failed
    #[error("Identity serialization failed: {0}")]
    Serialization(String),

    /// Identity deserialization failed
    #[error("Identity deserialization failed: {0}")]
    Deserialization(String),
}

impl From<Box<bincode::ErrorKind>> for CryptoError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CryptoError::Serialization(err.to_string())
    }
}
