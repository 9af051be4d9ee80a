//! ledgerbench node library
//!
//! Configuration loading and process setup shared by the `ledgerbench`
//! driver and the `ledgerbench-mock` network.

pub mod config;
pub mod logging;

pub use config::{BenchConfig, PipelineSection};
