//! Run driver: wires the stages together and measures one run

use crate::broadcaster::BroadcastPool;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::integrator::IntegratorStage;
use crate::metrics::PipelineMetrics;
use crate::observer::Observer;
use crate::proposer::ProposerPool;
use crate::queue::WorkQueue;
use crate::report::BenchmarkReport;
use crate::signer::SignerStage;
use crate::work_unit::WorkUnit;
use ledgerbench_crypto::Signer;
use ledgerbench_network::Connector;
use ledgerbench_protocol::{build_proposal, RandomSource};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// A configured benchmark, ready to run against a network
pub struct Benchmark {
    config: Arc<PipelineConfig>,
    identity: Arc<dyn Signer>,
    connector: Arc<dyn Connector>,
    rng: Arc<RandomSource>,
    /// Counters of the most recent run; replaced when a run starts
    metrics: Mutex<Arc<PipelineMetrics>>,
}

impl Benchmark {
    pub fn new(
        config: PipelineConfig,
        identity: Arc<dyn Signer>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            identity,
            connector,
            rng: Arc::new(RandomSource::from_entropy()),
            metrics: Mutex::new(Arc::new(PipelineMetrics::new()?)),
        })
    }

    /// Use a specific randomness source, e.g. a seeded one
    pub fn with_random_source(mut self, rng: RandomSource) -> Self {
        self.rng = Arc::new(rng);
        self
    }

    /// Counters of the latest run, or empty ones before the first run
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.lock().clone()
    }

    /// Run `n` transactions to completion
    pub async fn run(&self, n: usize) -> Result<BenchmarkReport> {
        self.run_with_token(n, CancellationToken::new()).await
    }

    /// Run `n` transactions; cancelling `cancel` aborts the run
    pub async fn run_with_token(&self, n: usize, cancel: CancellationToken) -> Result<BenchmarkReport> {
        if n == 0 {
            return Err(PipelineError::InvalidConfig(
                "transaction count must be positive".to_string(),
            ));
        }
        let config = &self.config;
        let connector = self.connector.as_ref();
        let metrics = Arc::new(PipelineMetrics::new()?);
        *self.metrics.lock() = metrics.clone();

        let deadline = config
            .max_duration
            .map(|limit| tokio::time::Instant::now() + limit);
        let token = cancel.child_token();

        let raw = WorkQueue::bounded("raw", config.raw_queue_capacity);
        let endorse: Vec<WorkQueue<Arc<WorkUnit>>> = config
            .endorsers
            .iter()
            .map(|_| WorkQueue::bounded("endorse", config.stage_queue_capacity))
            .collect();
        let integrate = WorkQueue::bounded("integrate", config.stage_queue_capacity);
        let broadcast = WorkQueue::bounded("broadcast", config.stage_queue_capacity);

        // subscribe first so no block of this run can be missed
        let subscribed = within(
            deadline,
            Observer::connect(
                connector,
                &config.committer,
                &config.channel,
                self.identity.as_ref(),
                &self.rng,
                metrics.clone(),
                &token,
            ),
        )
        .await;
        let mut observer = match subscribed {
            Some(observer) => observer?,
            None => {
                error!("Committer {} sent no baseline block before the deadline", config.committer);
                return Err(PipelineError::DeadlineExceeded {
                    committed: 0,
                    requested: n,
                });
            }
        };

        let proposers = ProposerPool::connect(
            connector,
            &config.endorsers,
            config.num_of_conn,
            config.client_per_conn,
            config.endorsement_timeout,
            endorse.clone(),
            integrate.clone(),
            metrics.clone(),
        )
        .await?;

        let broadcasters = BroadcastPool::connect(
            connector,
            &config.orderer,
            config.num_of_conn,
            broadcast.clone(),
            metrics.clone(),
        )
        .await?;

        let tracker = TaskTracker::new();

        SignerStage::new(self.identity.clone(), raw.clone(), endorse, metrics.clone())
            .spawn(config.signer_workers, &tracker, &token);
        proposers.spawn(&tracker, &token);
        IntegratorStage::new(
            self.identity.clone(),
            integrate,
            broadcast,
            metrics.clone(),
        )
        .spawn(config.integrator_workers, &tracker, &token);
        broadcasters.spawn(&tracker, &token);

        info!(
            "Starting run of {} transactions on {} with {} endorsers",
            n,
            config.channel,
            config.endorsers.len()
        );
        let started = Instant::now();
        tracker.spawn(generate(
            n,
            config.clone(),
            self.identity.clone(),
            self.rng.clone(),
            raw,
            metrics.clone(),
            token.clone(),
        ));

        let observed = within(deadline, observer.wait_for(n, started, &token)).await;
        let outcome = match observed {
            Some(outcome) => outcome,
            None => Err(PipelineError::DeadlineExceeded {
                committed: observer.committed(),
                requested: n,
            }),
        };

        token.cancel();
        tracker.close();
        if timeout(config.shutdown_timeout, tracker.wait()).await.is_err() {
            warn!(
                "{} pipeline tasks still running after {:?}",
                tracker.len(),
                config.shutdown_timeout
            );
        }

        let duration = match outcome {
            Ok(duration) => duration,
            Err(e) => {
                error!("Run failed: {}", e);
                return Err(e);
            }
        };

        let report = BenchmarkReport::new(
            n,
            observer.committed(),
            duration,
            metrics.snapshot(),
        );
        info!(
            "Run complete: {} committed in {:?} ({:.2} tps)",
            report.committed, report.duration, report.tps
        );
        Ok(report)
    }
}

/// Await `fut`, giving up at `deadline` if one is set
async fn within<F: Future>(deadline: Option<tokio::time::Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Build `n` proposals into the raw queue
async fn generate(
    n: usize,
    config: Arc<PipelineConfig>,
    identity: Arc<dyn Signer>,
    rng: Arc<RandomSource>,
    raw: WorkQueue<WorkUnit>,
    metrics: Arc<PipelineMetrics>,
    token: CancellationToken,
) {
    for seq in 0..n as u64 {
        if token.is_cancelled() {
            break;
        }

        let built = build_proposal(
            identity.as_ref(),
            &rng,
            &config.channel,
            &config.chaincode,
            &config.version,
            &config.args,
        );
        match built {
            Ok((proposal, tx_id)) => {
                metrics.generated.inc();
                if !raw.push(WorkUnit::new(seq, tx_id, proposal), &token).await {
                    break;
                }
            }
            Err(e) => {
                metrics.build_failures.inc();
                warn!("Dropping proposal {}: {}", seq, e);
            }
        }
    }
    debug!("Generator stopped after {} proposals", metrics.generated.get());
}
