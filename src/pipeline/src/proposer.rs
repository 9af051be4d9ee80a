//! Endorsement dispatch
//!
//! Every endorser gets `num_of_conn` connections, each shared by
//! `client_per_conn` workers pulling from that endorser's queue. Responses for
//! a transaction are gathered in a collector keyed by transaction id; the unit
//! moves on once every endorser answered, or is abandoned if any call failed.

use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::queue::WorkQueue;
use crate::work_unit::WorkUnit;
use dashmap::DashMap;
use ledgerbench_network::{Connector, EndorserConnection, Node};
use ledgerbench_protocol::messages::ProposalResponse;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

struct Collection {
    slots: Vec<Option<ProposalResponse>>,
    received: usize,
    failed: bool,
}

/// Outcome of recording one endorser's answer
#[derive(Debug)]
pub enum Collected {
    /// Other endorsers have not answered yet
    Pending,
    /// All endorsers answered successfully; responses are in endorser order
    Complete(WorkUnit),
    /// All endorsers answered and at least one call failed
    Abandoned,
}

/// Gathers per-endorser responses for in-flight transactions
pub struct ResponseCollector {
    endorsers: usize,
    pending: DashMap<String, Collection>,
}

impl ResponseCollector {
    pub fn new(endorsers: usize) -> Self {
        Self {
            endorsers,
            pending: DashMap::new(),
        }
    }

    /// Record endorser `index`'s answer for `unit`; `None` marks a failed call
    pub fn record(
        &self,
        unit: &WorkUnit,
        index: usize,
        response: Option<ProposalResponse>,
    ) -> Collected {
        {
            let mut entry = self
                .pending
                .entry(unit.tx_id.clone())
                .or_insert_with(|| Collection {
                    slots: vec![None; self.endorsers],
                    received: 0,
                    failed: false,
                });
            match response {
                Some(response) => entry.slots[index] = Some(response),
                None => entry.failed = true,
            }
            entry.received += 1;
            if entry.received < self.endorsers {
                return Collected::Pending;
            }
        }

        match self.pending.remove(&unit.tx_id) {
            Some((_, collection)) if !collection.failed => {
                let mut complete = unit.clone();
                complete.responses = collection.slots.into_iter().flatten().collect();
                Collected::Complete(complete)
            }
            _ => Collected::Abandoned,
        }
    }

    /// Transactions still waiting on at least one endorser
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

struct EndorserClient {
    index: usize,
    connection: Arc<dyn EndorserConnection>,
    input: WorkQueue<Arc<WorkUnit>>,
}

pub struct ProposerPool {
    clients: Vec<EndorserClient>,
    client_per_conn: usize,
    call_timeout: Duration,
    collector: Arc<ResponseCollector>,
    output: WorkQueue<WorkUnit>,
    metrics: Arc<PipelineMetrics>,
}

impl ProposerPool {
    /// Open `num_of_conn` connections to every endorser.
    ///
    /// `inputs[i]` feeds endorser `i`. Any connection failure is fatal.
    #[allow(clippy::too_many_arguments)]
    pub async fn connect(
        connector: &dyn Connector,
        endorsers: &[Node],
        num_of_conn: usize,
        client_per_conn: usize,
        call_timeout: Duration,
        inputs: Vec<WorkQueue<Arc<WorkUnit>>>,
        output: WorkQueue<WorkUnit>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        if inputs.len() != endorsers.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} endorser queues for {} endorsers",
                inputs.len(),
                endorsers.len()
            )));
        }

        let mut clients = Vec::with_capacity(endorsers.len() * num_of_conn);
        for (index, (node, input)) in endorsers.iter().zip(inputs).enumerate() {
            for _ in 0..num_of_conn {
                let connection = connector.connect_endorser(node).await.map_err(|source| {
                    PipelineError::ConnectionSetup {
                        node: node.to_string(),
                        source,
                    }
                })?;
                clients.push(EndorserClient {
                    index,
                    connection,
                    input: input.clone(),
                });
            }
            info!("Opened {} connections to endorser {}", num_of_conn, node);
        }

        Ok(Self {
            clients,
            client_per_conn,
            call_timeout,
            collector: Arc::new(ResponseCollector::new(endorsers.len())),
            output,
            metrics,
        })
    }

    pub fn collector(&self) -> Arc<ResponseCollector> {
        self.collector.clone()
    }

    pub fn spawn(self, tracker: &TaskTracker, token: &CancellationToken) {
        for client in self.clients {
            for _ in 0..self.client_per_conn {
                let worker = ProposerWorker {
                    index: client.index,
                    connection: client.connection.clone(),
                    input: client.input.clone(),
                    output: self.output.clone(),
                    collector: self.collector.clone(),
                    metrics: self.metrics.clone(),
                    call_timeout: self.call_timeout,
                };
                let token = token.clone();
                tracker.spawn(async move { worker.run(token).await });
            }
        }
    }
}

struct ProposerWorker {
    index: usize,
    connection: Arc<dyn EndorserConnection>,
    input: WorkQueue<Arc<WorkUnit>>,
    output: WorkQueue<WorkUnit>,
    collector: Arc<ResponseCollector>,
    metrics: Arc<PipelineMetrics>,
    call_timeout: Duration,
}

impl ProposerWorker {
    async fn run(self, token: CancellationToken) {
        let node = self.connection.node().clone();
        debug!("Proposer for {} started", node);

        while let Some(unit) = self.input.pop(&token).await {
            let response = match &unit.signed_proposal {
                Some(signed) => {
                    let call = timeout(self.call_timeout, self.connection.process_proposal(signed));
                    let outcome = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        outcome = call => outcome,
                    };
                    match outcome {
                        Ok(Ok(response)) => Some(response),
                        Ok(Err(e)) => {
                            warn!("Endorsement of tx {} by {} failed: {}", unit.tx_id, node, e);
                            None
                        }
                        Err(_) => {
                            warn!("Endorsement of tx {} by {} timed out", unit.tx_id, node);
                            None
                        }
                    }
                }
                None => {
                    warn!("Tx {} reached endorsement unsigned", unit.tx_id);
                    None
                }
            };

            match self.collector.record(&unit, self.index, response) {
                Collected::Pending => {}
                Collected::Complete(complete) => {
                    self.metrics.endorsed.inc();
                    if !self.output.push(complete, &token).await {
                        break;
                    }
                }
                Collected::Abandoned => {
                    self.metrics.endorsement_failures.inc();
                    warn!("Dropping tx {}: endorsement incomplete", unit.tx_id);
                }
            }
        }

        debug!("Proposer for {} stopped", node);
    }
}
