//! # ledgerbench Network Module
//!
//! Connections from the benchmark pipeline to endorsing peers and the
//! ordering service.
//!
//! ## Module Structure
//!
//! ```text
//! network/
//! ├── connector/   - Async traits the pipeline is written against
//! ├── transport/   - Length-delimited TCP implementation
//! ├── codec/       - bincode framing helpers
//! └── mock/        - In-memory ledger, in-process connector and TCP server
//! ```

pub mod codec;
pub mod connector;
pub mod error;
pub mod mock;
pub mod network_types;
pub mod transport;

pub use connector::{AckCounts, BroadcastConnection, Connector, DeliverStream, EndorserConnection};
pub use error::{NetworkError, Result};
pub use network_types::{Node, Service, TransportConfig};
pub use transport::TcpConnector;
