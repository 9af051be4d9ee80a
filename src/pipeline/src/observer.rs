//! Completion detection from the committed-block stream

use crate::error::{ObserverError, PipelineError, Result};
use crate::metrics::PipelineMetrics;
use ledgerbench_crypto::Signer;
use ledgerbench_network::{Connector, DeliverStream, Node};
use ledgerbench_protocol::{build_deliver_seek_envelope, count_channel_transactions, RandomSource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    /// Subscribed, baseline block not yet seen
    Waiting,
    Counting,
    Done,
}

/// Watches one peer's block stream and counts the run's transactions
pub struct Observer {
    stream: Box<dyn DeliverStream>,
    channel: String,
    state: ObserverState,
    baseline: u64,
    committed: usize,
    metrics: Arc<PipelineMetrics>,
}

impl Observer {
    /// Subscribe to `committer` from its newest block onwards.
    ///
    /// Returns once the baseline block arrived, so nothing committed after
    /// this call can be missed. Cancelling `token` abandons the wait.
    pub async fn connect(
        connector: &dyn Connector,
        committer: &Node,
        channel: &str,
        identity: &dyn Signer,
        rng: &RandomSource,
        metrics: Arc<PipelineMetrics>,
        token: &CancellationToken,
    ) -> Result<Self> {
        let seek = build_deliver_seek_envelope(channel, identity, rng)?;
        let stream = connector
            .connect_deliver(committer, &seek)
            .await
            .map_err(|source| PipelineError::ConnectionSetup {
                node: committer.to_string(),
                source,
            })?;

        let mut observer = Self {
            stream,
            channel: channel.to_string(),
            state: ObserverState::Waiting,
            baseline: 0,
            committed: 0,
            metrics,
        };

        let first = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(PipelineError::Cancelled),
            first = observer.stream.next_block() => first,
        };
        let baseline = match first {
            Ok(Some(block)) => block,
            Ok(None) => {
                return Err(ObserverError::Disconnected("stream ended before baseline block".into()).into())
            }
            Err(e) => return Err(ObserverError::from(e).into()),
        };
        observer.baseline = baseline.header.number;
        observer.state = ObserverState::Counting;
        info!(
            "Observing {} on {} from block {}",
            channel, committer, observer.baseline
        );

        Ok(observer)
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    /// Number of the block the count started after
    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Count committed transactions until `target` is reached.
    ///
    /// Returns the time elapsed since `started`.
    pub async fn wait_for(
        &mut self,
        target: usize,
        started: Instant,
        token: &CancellationToken,
    ) -> Result<Duration> {
        while self.committed < target {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(PipelineError::Cancelled),
                next = self.stream.next_block() => next,
            };

            let block = match next {
                Ok(Some(block)) => block,
                Ok(None) => {
                    return Err(ObserverError::Disconnected("delivery stream ended".into()).into())
                }
                Err(e) => return Err(ObserverError::from(e).into()),
            };

            let count = count_channel_transactions(&block, &self.channel);
            self.committed += count;
            self.metrics.committed.inc_by(count as u64);
            debug!(
                "Block {} committed {} transactions ({}/{})",
                block.header.number, count, self.committed, target
            );
        }

        self.state = ObserverState::Done;
        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbench_crypto::Identity;
    use ledgerbench_network::mock::{LocalConnector, MockLedger, MockLedgerConfig};
    use ledgerbench_protocol::{assemble_transaction, build_proposal, sign_proposal, ArgTemplate};
    use ledgerbench_network::mock::PeerFault;

    async fn commit(ledger: &MockLedger, identity: &Identity, rng: &RandomSource, channel: &str) {
        let args = [ArgTemplate::Uuid];
        let (proposal, _) = build_proposal(identity, rng, channel, "basic", "1.0", &args).unwrap();
        let signed = sign_proposal(&proposal, identity).unwrap();
        let response = ledger.endorse("peer0", &signed, &PeerFault::None).await.unwrap();
        let envelope = assemble_transaction(&proposal, identity, &[response]).unwrap();
        ledger.order(&envelope);
    }

    #[tokio::test]
    async fn test_baseline_block_is_not_counted() {
        let ledger = MockLedger::new(MockLedgerConfig {
            block_size: 2,
            ..Default::default()
        })
        .unwrap();
        let identity = Identity::generate("Org1MSP").unwrap();
        let rng = RandomSource::seeded(21);

        // two transactions committed before the observer subscribes
        commit(&ledger, &identity, &rng, "mychannel").await;
        commit(&ledger, &identity, &rng, "mychannel").await;
        assert_eq!(ledger.height(), 1);

        let connector = LocalConnector::new(ledger.clone());
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let mut observer = Observer::connect(
            &connector,
            &Node::new("peer0"),
            "mychannel",
            &identity,
            &rng,
            metrics.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(observer.baseline(), 1);
        assert_eq!(observer.state(), ObserverState::Counting);

        commit(&ledger, &identity, &rng, "otherchannel").await;
        commit(&ledger, &identity, &rng, "mychannel").await;
        commit(&ledger, &identity, &rng, "mychannel").await;
        ledger.cut_block();

        let token = CancellationToken::new();
        let elapsed = observer.wait_for(2, Instant::now(), &token).await.unwrap();
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(observer.committed(), 2);
        assert_eq!(observer.state(), ObserverState::Done);
        assert_eq!(metrics.snapshot().committed, 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let ledger = MockLedger::new(MockLedgerConfig::default()).unwrap();
        let identity = Identity::generate("Org1MSP").unwrap();
        let connector = LocalConnector::new(ledger);
        let mut observer = Observer::connect(
            &connector,
            &Node::new("peer0"),
            "mychannel",
            &identity,
            &RandomSource::seeded(22),
            Arc::new(PipelineMetrics::new().unwrap()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result = observer.wait_for(1, Instant::now(), &token).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unreachable_committer_is_fatal() {
        let ledger = MockLedger::new(MockLedgerConfig::default()).unwrap();
        let identity = Identity::generate("Org1MSP").unwrap();
        let connector = LocalConnector::new(ledger).with_fault("peer9", PeerFault::Down);
        let result = Observer::connect(
            &connector,
            &Node::new("peer9"),
            "mychannel",
            &identity,
            &RandomSource::seeded(23),
            Arc::new(PipelineMetrics::new().unwrap()),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(PipelineError::ConnectionSetup { .. })));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_baseline_wait() {
        let ledger = MockLedger::new(MockLedgerConfig::default()).unwrap();
        let identity = Identity::generate("Org1MSP").unwrap();
        let connector = LocalConnector::new(ledger).with_fault("peer0", PeerFault::Hang);

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            Observer::connect(
                &connector,
                &Node::new("peer0"),
                "mychannel",
                &identity,
                &RandomSource::seeded(24),
                Arc::new(PipelineMetrics::new().unwrap()),
                &token,
            ),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
