//! Network type definitions

use ledgerbench_protocol::messages::{ProposalResponse, SignedProposal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Address-only handle to a peer or orderer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub addr: String,
}

impl Node {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

/// Transport configuration shared by every outbound connection
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for establishing a TCP connection
    pub connect_timeout: Duration,

    /// Maximum size of a single frame
    pub max_frame_length: usize,

    /// Depth of the per-connection outbound request queue
    pub outbound_queue_depth: usize,

    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_length: 16 * 1024 * 1024,
            outbound_queue_depth: 256,
            nodelay: true,
        }
    }
}

/// Service selected by the first frame of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Service {
    Endorser,
    Broadcast,
    Deliver,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Endorser => f.write_str("endorser"),
            Service::Broadcast => f.write_str("broadcast"),
            Service::Deliver => f.write_str("deliver"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub service: Service,
}

/// Endorsement request tagged for multiplexing on a shared connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndorserRequest {
    pub id: u64,
    pub proposal: SignedProposal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndorserReply {
    pub id: u64,
    pub response: ProposalResponse,
}
