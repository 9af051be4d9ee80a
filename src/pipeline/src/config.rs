//! Run parameters consumed by the pipeline

use crate::error::{PipelineError, Result};
use ledgerbench_network::Node;
use ledgerbench_protocol::ArgTemplate;
use std::time::Duration;

pub const DEFAULT_SIGNER_WORKERS: usize = 5;
pub const DEFAULT_INTEGRATOR_WORKERS: usize = 5;
pub const DEFAULT_RAW_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_STAGE_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_ENDORSEMENT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub channel: String,
    pub chaincode: String,
    pub version: String,
    pub args: Vec<ArgTemplate>,

    /// Nodes every proposal is sent to for endorsement
    pub endorsers: Vec<Node>,

    /// Peer whose block stream decides completion
    pub committer: Node,

    pub orderer: Node,

    /// Connections per endorser, and to the orderer
    pub num_of_conn: usize,

    /// Logical clients sharing each endorser connection
    pub client_per_conn: usize,

    pub signer_workers: usize,
    pub integrator_workers: usize,
    pub raw_queue_capacity: usize,
    pub stage_queue_capacity: usize,

    /// Bound on a single endorsement call
    pub endorsement_timeout: Duration,

    /// Give up on the run after this long
    pub max_duration: Option<Duration>,

    /// How long to wait for stage tasks after the run ends
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            chaincode: String::new(),
            version: String::new(),
            args: Vec::new(),
            endorsers: Vec::new(),
            committer: Node::new(""),
            orderer: Node::new(""),
            num_of_conn: 1,
            client_per_conn: 1,
            signer_workers: DEFAULT_SIGNER_WORKERS,
            integrator_workers: DEFAULT_INTEGRATOR_WORKERS,
            raw_queue_capacity: DEFAULT_RAW_QUEUE_CAPACITY,
            stage_queue_capacity: DEFAULT_STAGE_QUEUE_CAPACITY,
            endorsement_timeout: DEFAULT_ENDORSEMENT_TIMEOUT,
            max_duration: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel.is_empty() {
            return Err(invalid("channel must not be empty"));
        }
        if self.chaincode.is_empty() {
            return Err(invalid("chaincode must not be empty"));
        }
        if self.endorsers.is_empty() {
            return Err(invalid("at least one endorser is required"));
        }

        let counts = [
            ("num_of_conn", self.num_of_conn),
            ("client_per_conn", self.client_per_conn),
            ("signer_workers", self.signer_workers),
            ("integrator_workers", self.integrator_workers),
            ("raw_queue_capacity", self.raw_queue_capacity),
            ("stage_queue_capacity", self.stage_queue_capacity),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(invalid(&format!("{} must be at least 1", name)));
            }
        }

        if self.endorsement_timeout.is_zero() {
            return Err(invalid("endorsement timeout must be positive"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> PipelineError {
    PipelineError::InvalidConfig(reason.to_string())
}
