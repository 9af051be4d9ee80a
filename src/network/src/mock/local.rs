//! In-process connector that talks to a [`MockLedger`] directly

use super::ledger::{MockLedger, PeerFault};
use crate::connector::{
    AckCounts, BroadcastConnection, Connector, DeliverStream, EndorserConnection,
};
use crate::error::{NetworkError, Result};
use crate::network_types::Node;
use async_trait::async_trait;
use dashmap::DashMap;
use ledgerbench_protocol::messages::{Block, Envelope, ProposalResponse, SignedProposal};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Connector backed by an in-memory ledger, with per-node fault injection
pub struct LocalConnector {
    ledger: Arc<MockLedger>,
    faults: DashMap<String, PeerFault>,
    calls: Arc<AtomicU64>,
}

impl LocalConnector {
    pub fn new(ledger: Arc<MockLedger>) -> Self {
        Self {
            ledger,
            faults: DashMap::new(),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make the node at `addr` misbehave
    pub fn with_fault(self, addr: impl Into<String>, fault: PeerFault) -> Self {
        self.faults.insert(addr.into(), fault);
        self
    }

    pub fn ledger(&self) -> &Arc<MockLedger> {
        &self.ledger
    }

    /// Endorse and broadcast calls issued through this connector
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fault(&self, node: &Node) -> PeerFault {
        self.faults
            .get(&node.addr)
            .map(|f| f.value().clone())
            .unwrap_or_default()
    }

    fn check_up(&self, node: &Node) -> Result<()> {
        if self.fault(node) == PeerFault::Down {
            return Err(NetworkError::Connection(format!("{}: connection refused", node)));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect_endorser(&self, node: &Node) -> Result<Arc<dyn EndorserConnection>> {
        self.check_up(node)?;
        Ok(Arc::new(LocalEndorser {
            node: node.clone(),
            ledger: self.ledger.clone(),
            fault: self.fault(node),
            calls: self.calls.clone(),
        }))
    }

    async fn connect_broadcast(&self, node: &Node) -> Result<Box<dyn BroadcastConnection>> {
        self.check_up(node)?;
        Ok(Box::new(LocalBroadcast {
            ledger: self.ledger.clone(),
            acks: AckCounts::default(),
            calls: self.calls.clone(),
        }))
    }

    async fn connect_deliver(&self, node: &Node, seek: &Envelope) -> Result<Box<dyn DeliverStream>> {
        self.check_up(node)?;
        let (newest, receiver) = self.ledger.subscribe(seek)?;
        if self.fault(node) == PeerFault::Hang {
            return Ok(Box::new(SilentDeliver));
        }
        Ok(Box::new(LocalDeliver {
            first: Some(newest),
            receiver,
        }))
    }
}

struct LocalEndorser {
    node: Node,
    ledger: Arc<MockLedger>,
    fault: PeerFault,
    calls: Arc<AtomicU64>,
}

#[async_trait]
impl EndorserConnection for LocalEndorser {
    async fn process_proposal(&self, proposal: &SignedProposal) -> Result<ProposalResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ledger
            .endorse(&self.node.addr, proposal, &self.fault)
            .await
    }

    fn node(&self) -> &Node {
        &self.node
    }
}

struct LocalBroadcast {
    ledger: Arc<MockLedger>,
    acks: AckCounts,
    calls: Arc<AtomicU64>,
}

#[async_trait]
impl BroadcastConnection for LocalBroadcast {
    async fn submit(&mut self, envelope: &Envelope) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ledger.order(envelope).status.is_success() {
            self.acks.accepted += 1;
        } else {
            self.acks.rejected += 1;
        }
        Ok(())
    }

    fn ack_counts(&self) -> AckCounts {
        self.acks
    }
}

struct LocalDeliver {
    first: Option<Block>,
    receiver: broadcast::Receiver<Arc<Block>>,
}

#[async_trait]
impl DeliverStream for LocalDeliver {
    async fn next_block(&mut self) -> Result<Option<Block>> {
        if let Some(block) = self.first.take() {
            return Ok(Some(block));
        }
        match self.receiver.recv().await {
            Ok(block) => Ok(Some(Block::clone(&block))),
            Err(RecvError::Closed) => Ok(None),
            Err(RecvError::Lagged(missed)) => Err(NetworkError::Transport(format!(
                "deliver stream lagged by {} blocks",
                missed
            ))),
        }
    }
}

/// Accepted subscription that never delivers anything
struct SilentDeliver;

#[async_trait]
impl DeliverStream for SilentDeliver {
    async fn next_block(&mut self) -> Result<Option<Block>> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ledger::MockLedgerConfig;
    use ledgerbench_crypto::Identity;
    use ledgerbench_protocol::{build_deliver_seek_envelope, RandomSource};

    #[tokio::test]
    async fn test_down_node_refuses_connections() {
        let ledger = MockLedger::new(MockLedgerConfig::default()).unwrap();
        let connector = LocalConnector::new(ledger).with_fault("peer1:7051", PeerFault::Down);

        assert!(connector.connect_endorser(&Node::new("peer0:7051")).await.is_ok());
        assert!(matches!(
            connector.connect_endorser(&Node::new("peer1:7051")).await,
            Err(NetworkError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_deliver_starts_with_newest_block() {
        let ledger = MockLedger::new(MockLedgerConfig::default()).unwrap();
        let connector = LocalConnector::new(ledger.clone());
        let identity = Identity::generate("Org1MSP").unwrap();
        let seek =
            build_deliver_seek_envelope("mychannel", &identity, &RandomSource::seeded(5)).unwrap();

        let mut stream = connector
            .connect_deliver(&Node::new("orderer:7050"), &seek)
            .await
            .unwrap();
        let first = stream.next_block().await.unwrap().unwrap();
        assert_eq!(first.header.number, 0);
        assert_eq!(connector.calls(), 0);
    }

    #[tokio::test]
    async fn test_hanging_node_never_delivers() {
        let ledger = MockLedger::new(MockLedgerConfig::default()).unwrap();
        let connector = LocalConnector::new(ledger).with_fault("peer1:7051", PeerFault::Hang);
        let identity = Identity::generate("Org1MSP").unwrap();
        let seek =
            build_deliver_seek_envelope("mychannel", &identity, &RandomSource::seeded(6)).unwrap();

        let mut stream = connector
            .connect_deliver(&Node::new("peer1:7051"), &seek)
            .await
            .unwrap();
        let next = tokio::time::timeout(std::time::Duration::from_millis(100), stream.next_block()).await;
        assert!(next.is_err());
    }
}
