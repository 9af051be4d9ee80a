//! Error types for benchmark runs

use ledgerbench_network::NetworkError;
use ledgerbench_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A connection needed by the run could not be established
    #[error("Failed to connect to {node}: {source}")]
    ConnectionSetup {
        node: String,
        #[source]
        source: NetworkError,
    },

    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),

    #[error("Run deadline exceeded: {committed} of {requested} transactions committed")]
    DeadlineExceeded { committed: usize, requested: usize },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Prometheus metric error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Failures of the committed-block stream; always fatal to a run
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Delivery stream disconnected: {0}")]
    Disconnected(String),

    #[error("Delivery rejected with status {status}: {info}")]
    Rejected { status: u16, info: String },
}

impl From<NetworkError> for ObserverError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Rejected { status, info } => ObserverError::Rejected { status, info },
            other => ObserverError::Disconnected(other.to_string()),
        }
    }
}
