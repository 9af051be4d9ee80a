//! TCP transport to peers and the ordering service
//!
//! Every connection starts with a [`Hello`] frame naming the service. The
//! endorser service is multiplexed: many logical clients share one socket and
//! replies are matched to requests by id, so a slow endorsement never blocks
//! the ones queued behind it.

use crate::codec::{self, FramedStream};
use crate::connector::{
    AckCounts, BroadcastConnection, Connector, DeliverStream, EndorserConnection,
};
use crate::error::{NetworkError, Result};
use crate::network_types::{EndorserReply, EndorserRequest, Hello, Node, Service, TransportConfig};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::StreamExt;
use ledgerbench_protocol::messages::{
    Block, BroadcastResponse, DeliverResponse, Envelope, ProposalResponse, SignedProposal,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

type PendingReplies = Arc<DashMap<u64, oneshot::Sender<ProposalResponse>>>;

/// Opens framed TCP connections
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TransportConfig,
}

impl TcpConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    async fn open(&self, node: &Node, service: Service) -> Result<FramedStream> {
        debug!("Connecting to {} service at {}", service, node);

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&node.addr))
            .await
            .map_err(|_| NetworkError::ConnectionTimeout)?
            .map_err(|e| NetworkError::Connection(format!("{}: {}", node, e)))?;
        stream.set_nodelay(self.config.nodelay)?;

        let mut framed = codec::framed(stream, self.config.max_frame_length);
        codec::send_message(&mut framed, &Hello { service }).await?;

        info!("Connected to {} service at {}", service, node);
        Ok(framed)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect_endorser(&self, node: &Node) -> Result<Arc<dyn EndorserConnection>> {
        let framed = self.open(node, Service::Endorser).await?;
        Ok(Arc::new(TcpEndorser::start(
            node.clone(),
            framed,
            self.config.outbound_queue_depth,
        )))
    }

    async fn connect_broadcast(&self, node: &Node) -> Result<Box<dyn BroadcastConnection>> {
        let framed = self.open(node, Service::Broadcast).await?;
        Ok(Box::new(TcpBroadcast::start(node.clone(), framed)))
    }

    async fn connect_deliver(&self, node: &Node, seek: &Envelope) -> Result<Box<dyn DeliverStream>> {
        let mut framed = self.open(node, Service::Deliver).await?;
        codec::send_message(&mut framed, seek).await?;
        Ok(Box::new(TcpDeliver {
            node: node.clone(),
            framed,
        }))
    }
}

/// Multiplexed endorser client
pub struct TcpEndorser {
    node: Node,
    outbound: mpsc::Sender<EndorserRequest>,
    pending: PendingReplies,
    next_id: AtomicU64,
    /// Cancelled once the reply reader has stopped
    closed: CancellationToken,
    _shutdown: DropGuard,
}

impl TcpEndorser {
    fn start(node: Node, framed: FramedStream, queue_depth: usize) -> Self {
        let (sink, stream) = framed.split::<Bytes>();
        let (outbound, requests) = mpsc::channel(queue_depth.max(1));
        let pending: PendingReplies = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();
        let closed = CancellationToken::new();

        tokio::spawn(write_requests(node.clone(), sink, requests));
        tokio::spawn(read_replies(
            node.clone(),
            stream,
            pending.clone(),
            shutdown.clone(),
            closed.clone(),
        ));

        Self {
            node,
            outbound,
            pending,
            next_id: AtomicU64::new(0),
            closed,
            _shutdown: shutdown.drop_guard(),
        }
    }
}

/// Removes a pending slot if the caller gives up before the reply arrives
struct PendingGuard<'a> {
    pending: &'a DashMap<u64, oneshot::Sender<ProposalResponse>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[async_trait]
impl EndorserConnection for TcpEndorser {
    async fn process_proposal(&self, proposal: &SignedProposal) -> Result<ProposalResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // checked after inserting: the reader marks itself closed before it
        // clears the map, so a slot added later is never left waiting
        if self.closed.is_cancelled() {
            return Err(NetworkError::Closed(format!(
                "endorser {} closed the connection",
                self.node
            )));
        }

        self.outbound
            .send(EndorserRequest {
                id,
                proposal: proposal.clone(),
            })
            .await
            .map_err(|_| NetworkError::Closed(format!("endorser {} writer stopped", self.node)))?;

        rx.await
            .map_err(|_| NetworkError::Closed(format!("endorser {} closed the connection", self.node)))
    }

    fn node(&self) -> &Node {
        &self.node
    }
}

async fn write_requests(
    node: Node,
    mut sink: SplitSink<FramedStream, Bytes>,
    mut requests: mpsc::Receiver<EndorserRequest>,
) {
    while let Some(request) = requests.recv().await {
        if let Err(e) = codec::send_message(&mut sink, &request).await {
            warn!("Failed to send proposal to {}: {}", node, e);
            break;
        }
    }
    debug!("Endorser writer for {} stopped", node);
}

async fn read_replies(
    node: Node,
    mut stream: SplitStream<FramedStream>,
    pending: PendingReplies,
    shutdown: CancellationToken,
    closed: CancellationToken,
) {
    loop {
        let reply = tokio::select! {
            _ = shutdown.cancelled() => break,
            reply = codec::recv_message::<_, EndorserReply>(&mut stream) => reply,
        };

        match reply {
            Ok(Some(reply)) => {
                if let Some((_, tx)) = pending.remove(&reply.id) {
                    let _ = tx.send(reply.response);
                }
            }
            Ok(None) => {
                debug!("Endorser {} closed the connection", node);
                break;
            }
            Err(e) => {
                warn!("Failed to read endorsement from {}: {}", node, e);
                break;
            }
        }
    }

    closed.cancel();
    // dropping the senders fails every call still waiting
    pending.clear();
}

/// Streaming broadcast client; acknowledgements are tallied in the background
pub struct TcpBroadcast {
    node: Node,
    sink: SplitSink<FramedStream, Bytes>,
    accepted: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    _shutdown: DropGuard,
}

impl TcpBroadcast {
    fn start(node: Node, framed: FramedStream) -> Self {
        let (sink, mut stream) = framed.split::<Bytes>();
        let accepted = Arc::new(AtomicU64::new(0));
        let rejected = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let reader = {
            let node = node.clone();
            let accepted = accepted.clone();
            let rejected = rejected.clone();
            let shutdown = shutdown.clone();
            async move {
                loop {
                    let ack = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        ack = codec::recv_message::<_, BroadcastResponse>(&mut stream) => ack,
                    };
                    match ack {
                        Ok(Some(ack)) if ack.status.is_success() => {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Some(ack)) => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                "Orderer {} rejected envelope: {:?} {}",
                                node, ack.status, ack.info
                            );
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Failed to read broadcast ack from {}: {}", node, e);
                            break;
                        }
                    }
                }
            }
        };
        tokio::spawn(reader);

        Self {
            node,
            sink,
            accepted,
            rejected,
            _shutdown: shutdown.drop_guard(),
        }
    }
}

#[async_trait]
impl BroadcastConnection for TcpBroadcast {
    async fn submit(&mut self, envelope: &Envelope) -> Result<()> {
        codec::send_message(&mut self.sink, envelope)
            .await
            .map_err(|e| NetworkError::Transport(format!("broadcast to {}: {}", self.node, e)))
    }

    fn ack_counts(&self) -> AckCounts {
        AckCounts {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

pub struct TcpDeliver {
    node: Node,
    framed: FramedStream,
}

#[async_trait]
impl DeliverStream for TcpDeliver {
    async fn next_block(&mut self) -> Result<Option<Block>> {
        match codec::recv_message::<_, DeliverResponse>(&mut self.framed).await? {
            Some(DeliverResponse::Block(block)) => Ok(Some(block)),
            Some(DeliverResponse::Status(status)) if status.is_success() => {
                debug!("Deliver stream from {} completed", self.node);
                Ok(None)
            }
            Some(DeliverResponse::Status(status)) => Err(NetworkError::Rejected {
                status: status.code(),
                info: format!("deliver from {}", self.node),
            }),
            None => Ok(None),
        }
    }
}
