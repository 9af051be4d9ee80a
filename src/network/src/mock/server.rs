//! TCP front end for a [`MockLedger`]
//!
//! Serves the endorser, broadcast and deliver services on a single listener,
//! dispatching on the [`Hello`] frame each connection opens with.

use super::ledger::{MockLedger, PeerFault};
use crate::codec::{self, FramedStream};
use crate::error::{NetworkError, Result};
use crate::network_types::{EndorserReply, EndorserRequest, Hello, Node, Service, TransportConfig};
use bytes::Bytes;
use futures::StreamExt;
use ledgerbench_protocol::messages::{DeliverResponse, Envelope, Status};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct MockServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Bind and start serving; `addr` may use port 0
    pub async fn bind(
        addr: &str,
        ledger: Arc<MockLedger>,
        config: TransportConfig,
        fault: PeerFault,
    ) -> Result<Self> {
        info!("Binding mock ledger to {}", addr);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetworkError::Connection(format!("bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        info!("Mock ledger listening on {}", local_addr);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(accept_loop(
            listener,
            local_addr.to_string(),
            ledger,
            config,
            Arc::new(fault),
            shutdown.clone(),
        ));

        Ok(Self {
            local_addr,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node(&self) -> Node {
        Node::new(self.local_addr.to_string())
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            error!("Mock ledger accept loop panicked: {}", e);
        }
        info!("Mock ledger shutdown complete");
    }
}

async fn accept_loop(
    listener: TcpListener,
    label: String,
    ledger: Arc<MockLedger>,
    config: TransportConfig,
    fault: Arc<PeerFault>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    debug!("Accepted connection from {}", remote);
                    let _ = stream.set_nodelay(config.nodelay);
                    let ledger = ledger.clone();
                    let fault = fault.clone();
                    let label = label.clone();
                    let token = shutdown.child_token();
                    let max_frame = config.max_frame_length;
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, max_frame, label, ledger, fault, token).await {
                            warn!("Connection from {} failed: {}", remote, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                }
            },
        }
    }
}

async fn serve(
    stream: TcpStream,
    max_frame_length: usize,
    label: String,
    ledger: Arc<MockLedger>,
    fault: Arc<PeerFault>,
    token: CancellationToken,
) -> Result<()> {
    let mut framed = codec::framed(stream, max_frame_length);
    let hello: Hello = match codec::recv_message(&mut framed).await? {
        Some(hello) => hello,
        None => return Ok(()),
    };
    debug!("Serving {} stream", hello.service);

    match hello.service {
        Service::Endorser => serve_endorser(framed, label, ledger, fault, token).await,
        Service::Broadcast => serve_broadcast(framed, ledger, token).await,
        Service::Deliver => serve_deliver(framed, ledger, token).await,
    }
}

async fn serve_endorser(
    framed: FramedStream,
    peer: String,
    ledger: Arc<MockLedger>,
    fault: Arc<PeerFault>,
    token: CancellationToken,
) -> Result<()> {
    let (mut sink, mut stream) = framed.split::<Bytes>();
    let (replies_tx, mut replies_rx) = mpsc::channel::<EndorserReply>(256);

    tokio::spawn(async move {
        while let Some(reply) = replies_rx.recv().await {
            if codec::send_message(&mut sink, &reply).await.is_err() {
                break;
            }
        }
    });

    loop {
        let request = tokio::select! {
            _ = token.cancelled() => break,
            request = codec::recv_message::<_, EndorserRequest>(&mut stream) => request?,
        };
        let Some(request) = request else { break };

        let ledger = ledger.clone();
        let fault = fault.clone();
        let replies = replies_tx.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            match ledger.endorse(&peer, &request.proposal, &fault).await {
                Ok(response) => {
                    let _ = replies
                        .send(EndorserReply {
                            id: request.id,
                            response,
                        })
                        .await;
                }
                Err(e) => warn!("Dropping proposal {}: {}", request.id, e),
            }
        });
    }

    // the writer drains once the in-flight endorsements finish
    Ok(())
}

async fn serve_broadcast(
    mut framed: FramedStream,
    ledger: Arc<MockLedger>,
    token: CancellationToken,
) -> Result<()> {
    loop {
        let envelope = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            envelope = codec::recv_message::<_, Envelope>(&mut framed) => envelope?,
        };
        let Some(envelope) = envelope else {
            return Ok(());
        };
        let ack = ledger.order(&envelope);
        codec::send_message(&mut framed, &ack).await?;
    }
}

async fn serve_deliver(
    mut framed: FramedStream,
    ledger: Arc<MockLedger>,
    token: CancellationToken,
) -> Result<()> {
    let Some(seek) = codec::recv_message::<_, Envelope>(&mut framed).await? else {
        return Ok(());
    };

    let (newest, mut blocks) = match ledger.subscribe(&seek) {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Rejecting deliver request: {}", e);
            let status = match e {
                NetworkError::Rejected { status: 404, .. } => Status::NotFound,
                _ => Status::BadRequest,
            };
            codec::send_message(&mut framed, &DeliverResponse::Status(status)).await?;
            return Ok(());
        }
    };
    codec::send_message(&mut framed, &DeliverResponse::Block(newest)).await?;

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => {
                codec::send_message(&mut framed, &DeliverResponse::Status(Status::ServiceUnavailable)).await?;
                return Ok(());
            }
            next = blocks.recv() => next,
        };
        match next {
            Ok(block) => {
                let response = DeliverResponse::Block((*block).clone());
                codec::send_message(&mut framed, &response).await?;
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Deliver client lagged by {} blocks", missed);
                codec::send_message(&mut framed, &DeliverResponse::Status(Status::ServiceUnavailable))
                    .await?;
                return Ok(());
            }
            Err(RecvError::Closed) => {
                codec::send_message(&mut framed, &DeliverResponse::Status(Status::Success)).await?;
                return Ok(());
            }
        }
    }
}
