//! Prometheus counters for a benchmark run

use prometheus::{IntCounter, Opts, Registry};

/// Per-stage progress and drop counters
pub struct PipelineMetrics {
    /// Proposals built by the generator
    pub generated: IntCounter,
    pub build_failures: IntCounter,

    pub signed: IntCounter,
    pub sign_failures: IntCounter,

    /// Units endorsed by every endorser
    pub endorsed: IntCounter,
    pub endorsement_failures: IntCounter,

    pub assembled: IntCounter,
    pub assembly_failures: IntCounter,

    /// Envelopes written to the orderer
    pub broadcast: IntCounter,
    pub broadcast_failures: IntCounter,

    /// Envelopes the orderer acknowledged with a failure status
    pub broadcast_rejections: IntCounter,

    /// Channel transactions seen in committed blocks
    pub committed: IntCounter,

    registry: Registry,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        Ok(Self {
            generated: counter(&registry, "generated_total", "Proposals generated")?,
            build_failures: counter(&registry, "build_failures_total", "Proposals that failed to build")?,
            signed: counter(&registry, "signed_total", "Proposals signed")?,
            sign_failures: counter(&registry, "sign_failures_total", "Proposals that failed to sign")?,
            endorsed: counter(&registry, "endorsed_total", "Units endorsed by all endorsers")?,
            endorsement_failures: counter(
                &registry,
                "endorsement_failures_total",
                "Units abandoned during endorsement",
            )?,
            assembled: counter(&registry, "assembled_total", "Transactions assembled")?,
            assembly_failures: counter(
                &registry,
                "assembly_failures_total",
                "Units rejected during assembly",
            )?,
            broadcast: counter(&registry, "broadcast_total", "Envelopes submitted to the orderer")?,
            broadcast_failures: counter(
                &registry,
                "broadcast_failures_total",
                "Envelopes that failed to submit",
            )?,
            broadcast_rejections: counter(
                &registry,
                "broadcast_rejections_total",
                "Envelopes rejected by the orderer",
            )?,
            committed: counter(&registry, "committed_total", "Transactions observed committed")?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            generated: self.generated.get(),
            build_failures: self.build_failures.get(),
            signed: self.signed.get(),
            sign_failures: self.sign_failures.get(),
            endorsed: self.endorsed.get(),
            endorsement_failures: self.endorsement_failures.get(),
            assembled: self.assembled.get(),
            assembly_failures: self.assembly_failures.get(),
            broadcast: self.broadcast.get(),
            broadcast_failures: self.broadcast_failures.get(),
            broadcast_rejections: self.broadcast_rejections.get(),
            committed: self.committed.get(),
        }
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help).namespace("ledgerbench"))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Point-in-time copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub generated: u64,
    pub build_failures: u64,
    pub signed: u64,
    pub sign_failures: u64,
    pub endorsed: u64,
    pub endorsement_failures: u64,
    pub assembled: u64,
    pub assembly_failures: u64,
    pub broadcast: u64,
    pub broadcast_failures: u64,
    pub broadcast_rejections: u64,
    pub committed: u64,
}

impl MetricsSnapshot {
    /// Units dropped by any stage
    pub fn dropped(&self) -> u64 {
        self.build_failures
            + self.sign_failures
            + self.endorsement_failures
            + self.assembly_failures
            + self.broadcast_failures
    }
}
