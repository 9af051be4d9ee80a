//! Run report: throughput and drop accounting

use crate::metrics::MetricsSnapshot;
use std::fmt;
use std::time::Duration;

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub requested: usize,
    pub committed: usize,
    pub duration: Duration,
    /// `requested / duration`
    pub tps: f64,
    pub metrics: MetricsSnapshot,
}

impl BenchmarkReport {
    pub fn new(
        requested: usize,
        committed: usize,
        duration: Duration,
        metrics: MetricsSnapshot,
    ) -> Self {
        let secs = duration.as_secs_f64();
        let tps = if secs > 0.0 {
            requested as f64 / secs
        } else {
            0.0
        };
        Self {
            requested,
            committed,
            duration,
            tps,
            metrics,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.metrics.dropped()
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tx: {}, duration: {:?}, tps: {:.2}",
            self.requested, self.duration, self.tps
        )?;
        write!(
            f,
            "dropped: {} (build {}, sign {}, endorse {}, assemble {}, broadcast {}), orderer rejections: {}",
            self.dropped(),
            self.metrics.build_failures,
            self.metrics.sign_failures,
            self.metrics.endorsement_failures,
            self.metrics.assembly_failures,
            self.metrics.broadcast_failures,
            self.metrics.broadcast_rejections,
        )
    }
}
