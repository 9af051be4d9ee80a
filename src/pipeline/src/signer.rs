//! Signer stage: signs raw proposals and fans them out to every endorser queue

use crate::metrics::PipelineMetrics;
use crate::queue::WorkQueue;
use crate::work_unit::WorkUnit;
use ledgerbench_crypto::Signer;
use ledgerbench_protocol::sign_proposal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SignerStage {
    identity: Arc<dyn Signer>,
    input: WorkQueue<WorkUnit>,
    outputs: Vec<WorkQueue<Arc<WorkUnit>>>,
    metrics: Arc<PipelineMetrics>,
}

impl SignerStage {
    pub fn new(
        identity: Arc<dyn Signer>,
        input: WorkQueue<WorkUnit>,
        outputs: Vec<WorkQueue<Arc<WorkUnit>>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            identity,
            input,
            outputs,
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
        debug!("Signer worker {} started", worker);

        while let Some(mut unit) = self.input.pop(&token).await {
            match sign_proposal(&unit.proposal, self.identity.as_ref()) {
                Ok(signed) => {
                    unit.signed_proposal = Some(signed);
                    self.metrics.signed.inc();

                    let unit = Arc::new(unit);
                    for queue in &self.outputs {
                        if !queue.push(unit.clone(), &token).await {
                            debug!("Signer worker {} cancelled", worker);
                            return;
                        }
                    }
                }
                Err(e) => {
                    self.metrics.sign_failures.inc();
                    warn!("Dropping tx {}: signing failed: {}", unit.tx_id, e);
                }
            }
        }

        debug!("Signer worker {} stopped", worker);
    }
}
