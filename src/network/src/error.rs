//! Error types for the network module

use ledgerbench_crypto::CryptoError;
use ledgerbench_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The remote side closed the stream
    #[error("Stream closed: {0}")]
    Closed(String),

    /// The remote side answered with a non-success status
    #[error("Rejected with status {status}: {info}")]
    Rejected { status: u16, info: String },

    #[error("Timeout")]
    Timeout,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Box<bincode::ErrorKind>> for NetworkError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        NetworkError::Serialization(format!("Bincode error: {}", err))
    }
}

impl From<ProtocolError> for NetworkError {
    fn from(err: ProtocolError) -> Self {
        NetworkError::Protocol(err.to_string())
    }
}

impl From<CryptoError> for NetworkError {
    fn from(err: CryptoError) -> Self {
        NetworkError::Protocol(format!("Crypto error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for NetworkError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        NetworkError::Timeout
    }
}
