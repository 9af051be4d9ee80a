//! Error types for protocol message construction

use ledgerbench_crypto::CryptoError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An argument template could not be parsed or expanded
    #[error("Invalid argument template '{template}': {reason}")]
    ArgumentParse { template: String, reason: String },

    /// A message or identity could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("At least one proposal response is required")]
    NoResponses,

    #[error("Malformed proposal: {0}")]
    MalformedProposal(String),

    #[error("Signer must be the same as the one referenced in the header")]
    IdentityMismatch,

    /// An endorser reported a status outside the success range
    #[error("Proposal response {index} was not successful, status {status}, msg {message}")]
    EndorsementMismatch {
        index: usize,
        status: i32,
        message: String,
    },

    /// Endorsers disagree on the effects of the proposal
    #[error("Proposal response payload {index} does not match the first endorsement")]
    EndorsementDisagreement { index: usize },

    /// A received message could not be decoded
    #[error("Decoding error: {0}")]
    Decoding(String),
}

impl ProtocolError {
    pub fn argument<T: Into<String>, R: Into<String>>(template: T, reason: R) -> Self {
        ProtocolError::ArgumentParse {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

impl From<CryptoError> for ProtocolError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Serialization(msg) => ProtocolError::Encoding(msg),
            other => ProtocolError::Signing(other.to_string()),
        }
    }
}
