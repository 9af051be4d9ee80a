//! ledgerbench - throughput benchmark driver
//!
//! Pushes N chaincode invocations through sign, endorse, assemble and
//! broadcast, then waits until all of them are seen in committed blocks.

use anyhow::{Context, Result};
use clap::Parser;
use ledgerbench_network::TcpConnector;
use ledgerbench_node::{logging, BenchConfig};
use ledgerbench_pipeline::Benchmark;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// ledgerbench CLI
#[derive(Parser)]
#[command(name = "ledgerbench")]
#[command(about = "Throughput benchmark for permissioned ledger networks")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(env = "LEDGERBENCH_CONFIG")]
    config: PathBuf,

    /// Number of transactions to generate
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    transactions: u64,

    /// Abort the run after this many seconds (overrides config)
    #[arg(long)]
    max_duration: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    info!("Starting ledgerbench v{}", env!("CARGO_PKG_VERSION"));

    let config = BenchConfig::load(&cli.config)?;
    config.validate()?;
    info!("Loaded configuration from {:?}", cli.config);

    let identity = config.load_identity()?;
    let mut pipeline = config.to_pipeline_config()?;
    if let Some(secs) = cli.max_duration {
        pipeline.max_duration = Some(Duration::from_secs(secs));
    }

    let connector = Arc::new(TcpConnector::new(config.transport_config()));
    let benchmark = Benchmark::new(pipeline, Arc::new(identity), connector)
        .context("Failed to set up benchmark")?;

    let n = usize::try_from(cli.transactions).context("Transaction count too large")?;
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal (Ctrl+C)");
                cancel.cancel();
            }
        })
    };

    let result = benchmark.run_with_token(n, cancel).await;
    ctrl_c.abort();

    let report = result.context("Benchmark run failed")?;
    println!("{}", report);
    Ok(())
}
