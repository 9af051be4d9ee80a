//! # ledgerbench Pipeline
//!
//! The concurrent load pipeline. Each transaction is generated, signed,
//! endorsed by every configured endorser, assembled into an envelope and
//! broadcast to the orderer, while an observer counts committed transactions
//! on the block stream to decide when the run is complete.
//!
//! ```text
//! generate ─▶ raw ─▶ signer ─┬▶ endorse[0] ─▶ proposers ─┐
//!                            └▶ endorse[n] ─▶ proposers ─┴▶ integrate ─▶ integrator ─▶ broadcast ─▶ orderer
//!                                                                       observer ◀── committer blocks
//! ```
//!
//! All queues are bounded and every stage stops on one shared
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod broadcaster;
pub mod config;
pub mod driver;
pub mod error;
pub mod integrator;
pub mod metrics;
pub mod observer;
pub mod proposer;
pub mod queue;
pub mod report;
pub mod signer;
pub mod work_unit;

pub use config::PipelineConfig;
pub use driver::Benchmark;
pub use error::{ObserverError, PipelineError, Result};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use observer::{Observer, ObserverState};
pub use queue::WorkQueue;
pub use report::BenchmarkReport;
pub use work_unit::WorkUnit;
