//! Mock ledger network
//!
//! A single-channel stand-in for peers and the ordering service, reachable
//! either in-process through [`LocalConnector`] or over TCP through
//! [`MockServer`]. Used by tests and by the `ledgerbench-mock` binary.

pub mod ledger;
pub mod local;
pub mod server;

pub use ledger::{LedgerStats, MockLedger, MockLedgerConfig, PeerFault};
pub use local::LocalConnector;
pub use server::MockServer;
