//! Integrator stage: turns agreeing endorsements into signed envelopes

use crate::metrics::PipelineMetrics;
use crate::queue::WorkQueue;
use crate::work_unit::WorkUnit;
use ledgerbench_crypto::Signer;
use ledgerbench_protocol::assemble_transaction;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct IntegratorStage {
    identity: Arc<dyn Signer>,
    input: WorkQueue<WorkUnit>,
    output: WorkQueue<WorkUnit>,
    metrics: Arc<PipelineMetrics>,
}

impl IntegratorStage {
    pub fn new(
        identity: Arc<dyn Signer>,
        input: WorkQueue<WorkUnit>,
        output: WorkQueue<WorkUnit>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            identity,
            input,
            output,
            metrics,
        }
    }

    pub fn spawn(self, workers: usize, tracker: &TaskTracker, token: &CancellationToken) {
        for worker in 0..workers {
            let stage = self.clone();
            let token = token.clone();
            tracker.spawn(async move { stage.run(worker, token).await });
        }
    }

    async fn run(self, worker: usize, token: CancellationToken) {
        debug!("Integrator worker {} started", worker);

        while let Some(mut unit) = self.input.pop(&token).await {
            match assemble_transaction(&unit.proposal, self.identity.as_ref(), &unit.responses) {
                Ok(envelope) => {
                    unit.envelope = Some(envelope);
                    self.metrics.assembled.inc();
                    if !self.output.push(unit, &token).await {
                        break;
                    }
                }
                Err(e) => {
                    self.metrics.assembly_failures.inc();
                    warn!("Dropping tx {}: {}", unit.tx_id, e);
                }
            }
        }

        debug!("Integrator worker {} stopped", worker);
    }
}
