//! Pipeline integration tests
//!
//! Full runs against the in-memory ledger (and one over TCP):
//! - completion and throughput accounting
//! - endorsement disagreement and failing endorsers
//! - deadlines, cancellation and connection failures

use ledgerbench_crypto::{Identity, Signer};
use ledgerbench_network::mock::{
    LocalConnector, MockLedger, MockLedgerConfig, MockServer, PeerFault,
};
use ledgerbench_network::{Node, TcpConnector, TransportConfig};
use ledgerbench_pipeline::{Benchmark, PipelineConfig, PipelineError};
use ledgerbench_protocol::{ArgTemplate, RandomSource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PEER0: &str = "peer0.org1:7051";
const PEER1: &str = "peer0.org2:7051";
const ORDERER: &str = "orderer0:7050";

fn ledger() -> Arc<MockLedger> {
    MockLedger::new(MockLedgerConfig::default()).unwrap()
}

fn identity() -> Arc<dyn Signer> {
    Arc::new(Identity::generate("Org1MSP").unwrap())
}

fn config(max_duration: Duration) -> PipelineConfig {
    PipelineConfig {
        channel: "mychannel".to_string(),
        chaincode: "basic".to_string(),
        version: "1.0".to_string(),
        args: ArgTemplate::parse_all(&["CreateAsset", "uuid", "randomString8", "randomNumber1_100"])
            .unwrap(),
        endorsers: vec![Node::new(PEER0), Node::new(PEER1)],
        committer: Node::new(PEER1),
        orderer: Node::new(ORDERER),
        num_of_conn: 2,
        client_per_conn: 4,
        max_duration: Some(max_duration),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_run_commits_every_transaction() {
    let ledger = ledger();
    let timer = CancellationToken::new();
    ledger.spawn_batch_timer(timer.clone());
    let connector = Arc::new(LocalConnector::new(ledger.clone()));

    let benchmark = Benchmark::new(config(Duration::from_secs(30)), identity(), connector)
        .unwrap()
        .with_random_source(RandomSource::seeded(7));
    let report = benchmark.run(100).await.unwrap();
    timer.cancel();

    assert_eq!(report.requested, 100);
    assert!(report.committed >= 100);
    assert!(report.duration > Duration::ZERO);
    let expected_tps = 100.0 / report.duration.as_secs_f64();
    assert!((report.tps - expected_tps).abs() < 1e-6);

    assert_eq!(report.metrics.generated, 100);
    assert_eq!(report.metrics.endorsed, 100);
    assert_eq!(report.metrics.broadcast, 100);
    assert_eq!(report.dropped(), 0);
    assert_eq!(ledger.stats().envelopes, 100);
    assert_eq!(ledger.stats().endorsements, 200);
}

#[tokio::test]
async fn test_disagreeing_endorser_blocks_every_transaction() {
    let ledger = ledger();
    let timer = CancellationToken::new();
    ledger.spawn_batch_timer(timer.clone());
    let connector = Arc::new(LocalConnector::new(ledger.clone()).with_fault(PEER1, PeerFault::Disagree));

    let benchmark = Benchmark::new(config(Duration::from_secs(1)), identity(), connector).unwrap();
    let result = benchmark.run(20).await;
    timer.cancel();

    match result {
        Err(PipelineError::DeadlineExceeded {
            committed,
            requested,
        }) => {
            assert_eq!(committed, 0);
            assert_eq!(requested, 20);
        }
        other => panic!("expected deadline, got {:?}", other.map(|r| r.committed)),
    }

    let metrics = benchmark.metrics().snapshot();
    assert_eq!(metrics.endorsed, 20);
    assert_eq!(metrics.assembly_failures, 20);
    assert_eq!(metrics.broadcast, 0);
    assert_eq!(ledger.stats().envelopes, 0);
}

#[tokio::test]
async fn test_failed_endorsements_are_dropped() {
    let ledger = ledger();
    let connector = Arc::new(LocalConnector::new(ledger.clone()).with_fault(PEER0, PeerFault::FailCalls));

    let benchmark = Benchmark::new(config(Duration::from_secs(1)), identity(), connector).unwrap();
    let result = benchmark.run(15).await;
    assert!(matches!(result, Err(PipelineError::DeadlineExceeded { committed: 0, .. })));

    let metrics = benchmark.metrics().snapshot();
    assert_eq!(metrics.endorsement_failures, 15);
    assert_eq!(metrics.assembled, 0);
}

#[tokio::test]
async fn test_error_status_fails_assembly() {
    let ledger = ledger();
    let connector = Arc::new(LocalConnector::new(ledger).with_fault(PEER0, PeerFault::Status(500)));

    let benchmark = Benchmark::new(config(Duration::from_secs(1)), identity(), connector).unwrap();
    assert!(benchmark.run(5).await.is_err());
    assert_eq!(benchmark.metrics().snapshot().assembly_failures, 5);
}

#[tokio::test]
async fn test_no_network_calls_after_cancellation() {
    let ledger = ledger();
    let connector = Arc::new(LocalConnector::new(ledger).with_fault(PEER0, PeerFault::Hang));

    let benchmark = Benchmark::new(
        config(Duration::from_millis(300)),
        identity(),
        connector.clone(),
    )
    .unwrap();
    let result = benchmark.run(50).await;
    assert!(matches!(result, Err(PipelineError::DeadlineExceeded { .. })));

    let calls = connector.calls();
    assert!(calls > 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(connector.calls(), calls);
}

#[tokio::test]
async fn test_external_cancel_stops_run() {
    let ledger = ledger();
    let connector = Arc::new(LocalConnector::new(ledger).with_fault(PEER0, PeerFault::Hang));
    let mut config = config(Duration::from_secs(30));
    config.max_duration = None;

    let benchmark = Benchmark::new(config, identity(), connector).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(10), benchmark.run_with_token(10, cancel))
        .await
        .unwrap();
    assert!(matches!(result, Err(PipelineError::Cancelled)));
}

#[tokio::test]
async fn test_silent_committer_hits_deadline() {
    // PEER1 is the committer: it accepts the subscription but never sends a block
    let connector = Arc::new(LocalConnector::new(ledger()).with_fault(PEER1, PeerFault::Hang));
    let benchmark = Benchmark::new(config(Duration::from_millis(200)), identity(), connector.clone()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(3), benchmark.run(5))
        .await
        .unwrap();
    assert!(matches!(
        result,
        Err(PipelineError::DeadlineExceeded {
            committed: 0,
            requested: 5
        })
    ));
    assert_eq!(connector.calls(), 0);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_baseline_block() {
    let connector = Arc::new(LocalConnector::new(ledger()).with_fault(PEER1, PeerFault::Hang));
    let mut config = config(Duration::from_secs(30));
    config.max_duration = None;
    let benchmark = Benchmark::new(config, identity(), connector).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(3), benchmark.run_with_token(5, cancel))
        .await
        .unwrap();
    assert!(matches!(result, Err(PipelineError::Cancelled)));
}

#[tokio::test]
async fn test_runs_do_not_share_counters() {
    let ledger = ledger();
    let timer = CancellationToken::new();
    ledger.spawn_batch_timer(timer.clone());
    let connector = Arc::new(LocalConnector::new(ledger.clone()));
    let benchmark = Benchmark::new(config(Duration::from_secs(30)), identity(), connector).unwrap();

    let first = benchmark.run(10).await.unwrap();
    let second = benchmark.run(10).await.unwrap();
    timer.cancel();

    assert_eq!(first.metrics.generated, 10);
    assert_eq!(second.metrics.generated, 10);
    assert_eq!(second.metrics.broadcast, 10);
    assert_eq!(second.metrics.committed, second.committed as u64);
    assert_eq!(benchmark.metrics().snapshot().generated, 10);
    assert_eq!(ledger.stats().envelopes, 20);
}

#[tokio::test]
async fn test_unreachable_endorser_is_fatal() {
    let ledger = ledger();
    let connector = Arc::new(LocalConnector::new(ledger).with_fault(PEER0, PeerFault::Down));

    let benchmark = Benchmark::new(config(Duration::from_secs(5)), identity(), connector).unwrap();
    match benchmark.run(10).await {
        Err(PipelineError::ConnectionSetup { node, .. }) => assert_eq!(node, PEER0),
        other => panic!("expected connection failure, got {:?}", other.map(|r| r.committed)),
    }
}

#[tokio::test]
async fn test_zero_transactions_rejected() {
    let connector = Arc::new(LocalConnector::new(ledger()));
    let benchmark = Benchmark::new(config(Duration::from_secs(5)), identity(), connector).unwrap();
    assert!(matches!(
        benchmark.run(0).await,
        Err(PipelineError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_run_over_tcp() {
    let ledger = ledger();
    let timer = CancellationToken::new();
    ledger.spawn_batch_timer(timer.clone());

    let peer0 = MockServer::bind("127.0.0.1:0", ledger.clone(), TransportConfig::default(), PeerFault::None)
        .await
        .unwrap();
    let peer1 = MockServer::bind("127.0.0.1:0", ledger.clone(), TransportConfig::default(), PeerFault::None)
        .await
        .unwrap();

    let config = PipelineConfig {
        endorsers: vec![peer0.node(), peer1.node()],
        committer: peer1.node(),
        orderer: peer0.node(),
        ..config(Duration::from_secs(30))
    };
    let connector = Arc::new(TcpConnector::new(TransportConfig::default()));
    let benchmark = Benchmark::new(config, identity(), connector).unwrap();

    let report = benchmark.run(50).await.unwrap();
    assert!(report.committed >= 50);
    assert_eq!(report.metrics.broadcast, 50);
    assert_eq!(report.dropped(), 0);

    timer.cancel();
    peer0.shutdown().await;
    peer1.shutdown().await;
}
