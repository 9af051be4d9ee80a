//! Connection seams between the benchmark pipeline and the ledger network

use crate::error::Result;
use crate::network_types::Node;
use async_trait::async_trait;
use ledgerbench_protocol::messages::{Block, Envelope, ProposalResponse, SignedProposal};
use std::sync::Arc;

/// Acknowledgements observed on a broadcast stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckCounts {
    pub accepted: u64,
    pub rejected: u64,
}

/// Endorsement client; shared by several logical senders at once
#[async_trait]
pub trait EndorserConnection: Send + Sync {
    /// Send a signed proposal and wait for the endorsement
    async fn process_proposal(&self, proposal: &SignedProposal) -> Result<ProposalResponse>;

    /// Node this connection talks to
    fn node(&self) -> &Node;
}

/// Streaming submission channel to the ordering service
#[async_trait]
pub trait BroadcastConnection: Send {
    /// Submit an envelope; returns once it has been written
    async fn submit(&mut self, envelope: &Envelope) -> Result<()>;

    /// Acknowledgements received so far
    fn ack_counts(&self) -> AckCounts;
}

/// Committed block feed
#[async_trait]
pub trait DeliverStream: Send {
    /// Next delivered block; `None` once the remote ended the stream
    async fn next_block(&mut self) -> Result<Option<Block>>;
}

/// Factory for all connections a run opens
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_endorser(&self, node: &Node) -> Result<Arc<dyn EndorserConnection>>;

    async fn connect_broadcast(&self, node: &Node) -> Result<Box<dyn BroadcastConnection>>;

    /// Open a deliver stream with the given signed seek request
    async fn connect_deliver(&self, node: &Node, seek: &Envelope) -> Result<Box<dyn DeliverStream>>;
}
