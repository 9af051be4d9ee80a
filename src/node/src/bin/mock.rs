//! ledgerbench-mock - in-memory ledger network for trying the driver
//!
//! Serves endorser, broadcast and deliver on one address. Every connection
//! talks to the same ledger, so one process can stand in for all endorsers,
//! the committer and the orderer.

use anyhow::{Context, Result};
use clap::Parser;
use ledgerbench_network::mock::{MockLedger, MockLedgerConfig, MockServer, PeerFault};
use ledgerbench_network::TransportConfig;
use ledgerbench_node::logging;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// ledgerbench mock network CLI
#[derive(Parser)]
#[command(name = "ledgerbench-mock")]
#[command(about = "In-memory ledger network for ledgerbench")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7050", env = "LEDGERBENCH_MOCK_LISTEN")]
    listen: String,

    /// Envelopes per block
    #[arg(long, default_value_t = 10)]
    block_size: usize,

    /// Cut partial blocks after this many milliseconds
    #[arg(long, default_value_t = 100)]
    batch_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let ledger = MockLedger::new(MockLedgerConfig {
        block_size: cli.block_size,
        batch_timeout: Duration::from_millis(cli.batch_timeout_ms.max(1)),
        ..Default::default()
    })
    .context("Failed to create mock ledger")?;

    let timer = CancellationToken::new();
    let batch_timer = ledger.spawn_batch_timer(timer.clone());

    let server = MockServer::bind(&cli.listen, ledger.clone(), TransportConfig::default(), PeerFault::None)
        .await
        .context("Failed to start mock server")?;
    info!(
        "Mock network on {} (block size {}, batch timeout {}ms)",
        server.local_addr(),
        cli.block_size,
        cli.batch_timeout_ms
    );

    tokio::select! {
        _ = signal::ctrl_c() => info!("Received shutdown signal (Ctrl+C)"),
        _ = shutdown_signal() => info!("Received shutdown signal (SIGTERM)"),
    }

    timer.cancel();
    let _ = batch_timer.await;
    server.shutdown().await;

    let stats = ledger.stats();
    info!(
        "Served {} endorsements, {} envelopes, {} blocks",
        stats.endorsements, stats.envelopes, stats.blocks
    );
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    std::future::pending::<()>().await
}
