//! Broadcast pool: submits assembled envelopes to the ordering service

use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::queue::WorkQueue;
use crate::work_unit::WorkUnit;
use ledgerbench_network::{BroadcastConnection, Connector, Node};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub struct BroadcastPool {
    orderer: Node,
    connections: Vec<Box<dyn BroadcastConnection>>,
    input: WorkQueue<WorkUnit>,
    metrics: Arc<PipelineMetrics>,
}

impl BroadcastPool {
    /// Open `num_of_conn` broadcast streams; any failure is fatal
    pub async fn connect(
        connector: &dyn Connector,
        orderer: &Node,
        num_of_conn: usize,
        input: WorkQueue<WorkUnit>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        let mut connections = Vec::with_capacity(num_of_conn);
        for _ in 0..num_of_conn {
            let connection = connector.connect_broadcast(orderer).await.map_err(|source| {
                PipelineError::ConnectionSetup {
                    node: orderer.to_string(),
                    source,
                }
            })?;
            connections.push(connection);
        }
        info!("Opened {} broadcast streams to {}", num_of_conn, orderer);

        Ok(Self {
            orderer: orderer.clone(),
            connections,
            input,
            metrics,
        })
    }

    /// One worker per connection
    pub fn spawn(self, tracker: &TaskTracker, token: &CancellationToken) {
        for (worker, connection) in self.connections.into_iter().enumerate() {
            let input = self.input.clone();
            let metrics = self.metrics.clone();
            let orderer = self.orderer.clone();
            let token = token.clone();
            tracker.spawn(async move {
                run_worker(worker, orderer, connection, input, metrics, token).await
            });
        }
    }
}

async fn run_worker(
    worker: usize,
    orderer: Node,
    mut connection: Box<dyn BroadcastConnection>,
    input: WorkQueue<WorkUnit>,
    metrics: Arc<PipelineMetrics>,
    token: CancellationToken,
) {
    debug!("Broadcast worker {} for {} started", worker, orderer);

    while let Some(unit) = input.pop(&token).await {
        let Some(envelope) = unit.envelope.as_ref() else {
            metrics.broadcast_failures.inc();
            warn!("Dropping tx {}: no envelope to broadcast", unit.tx_id);
            continue;
        };

        let submitted = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            submitted = connection.submit(envelope) => submitted,
        };
        match submitted {
            Ok(()) => metrics.broadcast.inc(),
            Err(e) => {
                metrics.broadcast_failures.inc();
                warn!("Dropping tx {}: broadcast to {} failed: {}", unit.tx_id, orderer, e);
            }
        }
    }

    let acks = connection.ack_counts();
    metrics.broadcast_rejections.inc_by(acks.rejected);
    debug!(
        "Broadcast worker {} stopped ({} accepted, {} rejected)",
        worker, acks.accepted, acks.rejected
    );
}
