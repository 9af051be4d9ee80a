//! Benchmark configuration loading and validation

use anyhow::{Context, Result};
use ledgerbench_crypto::keys::load_identity;
use ledgerbench_crypto::Identity;
use ledgerbench_network::{Node, TransportConfig};
use ledgerbench_pipeline::PipelineConfig;
use ledgerbench_protocol::ArgTemplate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete benchmark configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchConfig {
    /// Peers every proposal is endorsed by
    #[serde(default)]
    pub endorsers: Vec<Node>,

    /// Peer whose block stream is observed
    pub committer: Node,

    pub orderer: Node,

    pub channel: String,
    pub chaincode: String,
    #[serde(default)]
    pub version: String,

    /// Argument templates, one per chaincode argument
    #[serde(default)]
    pub args: Vec<String>,

    pub mspid: String,
    pub private_key: PathBuf,
    pub sign_cert: PathBuf,

    #[serde(default = "default_one")]
    pub num_of_conn: usize,
    #[serde(default = "default_one")]
    pub client_per_conn: usize,

    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Directory relative key paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSection {
    #[serde(default = "default_workers")]
    pub signer_workers: usize,
    #[serde(default = "default_workers")]
    pub integrator_workers: usize,
    #[serde(default = "default_raw_queue_capacity")]
    pub raw_queue_capacity: usize,
    #[serde(default = "default_stage_queue_capacity")]
    pub stage_queue_capacity: usize,
    #[serde(default = "default_endorsement_timeout")]
    pub endorsement_timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 0 means unbounded
    #[serde(default)]
    pub max_duration_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            signer_workers: default_workers(),
            integrator_workers: default_workers(),
            raw_queue_capacity: default_raw_queue_capacity(),
            stage_queue_capacity: default_stage_queue_capacity(),
            endorsement_timeout_ms: default_endorsement_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            max_duration_secs: 0,
        }
    }
}

// Default value functions
fn default_one() -> usize { 1 }
fn default_workers() -> usize { 5 }
fn default_raw_queue_capacity() -> usize { 100 }
fn default_stage_queue_capacity() -> usize { 10 }
fn default_endorsement_timeout() -> u64 { 10_000 }
fn default_connect_timeout() -> u64 { 5_000 }

impl BenchConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;

        let mut config: BenchConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration file {:?}", path))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.endorsers.is_empty() {
            anyhow::bail!("At least one endorser is required");
        }
        if self.channel.is_empty() {
            anyhow::bail!("Channel must not be empty");
        }
        if self.chaincode.is_empty() {
            anyhow::bail!("Chaincode must not be empty");
        }
        if self.mspid.is_empty() {
            anyhow::bail!("MSP id must not be empty");
        }
        if self.num_of_conn == 0 || self.client_per_conn == 0 {
            anyhow::bail!("num_of_conn and client_per_conn must be at least 1");
        }

        let p = &self.pipeline;
        if p.signer_workers == 0 || p.integrator_workers == 0 {
            anyhow::bail!("Worker counts must be at least 1");
        }
        if p.raw_queue_capacity == 0 || p.stage_queue_capacity == 0 {
            anyhow::bail!("Queue capacities must be at least 1");
        }
        if p.endorsement_timeout_ms == 0 || p.connect_timeout_ms == 0 {
            anyhow::bail!("Timeouts must be positive");
        }

        self.arg_templates()?;
        Ok(())
    }

    pub fn arg_templates(&self) -> Result<Vec<ArgTemplate>> {
        ArgTemplate::parse_all(&self.args).context("Invalid argument template")
    }

    /// Get absolute private key path
    pub fn private_key_path(&self) -> PathBuf {
        self.resolve(&self.private_key)
    }

    /// Get absolute certificate path
    pub fn sign_cert_path(&self) -> PathBuf {
        self.resolve(&self.sign_cert)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Load the submitter identity from the configured key material
    pub fn load_identity(&self) -> Result<Identity> {
        let key = self.private_key_path();
        let cert = self.sign_cert_path();
        load_identity(&self.mspid, &key, &cert)
            .with_context(|| format!("Failed to load identity from {:?} and {:?}", key, cert))
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.pipeline.connect_timeout_ms),
            ..Default::default()
        }
    }

    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        let p = &self.pipeline;
        Ok(PipelineConfig {
            channel: self.channel.clone(),
            chaincode: self.chaincode.clone(),
            version: self.version.clone(),
            args: self.arg_templates()?,
            endorsers: self.endorsers.clone(),
            committer: self.committer.clone(),
            orderer: self.orderer.clone(),
            num_of_conn: self.num_of_conn,
            client_per_conn: self.client_per_conn,
            signer_workers: p.signer_workers,
            integrator_workers: p.integrator_workers,
            raw_queue_capacity: p.raw_queue_capacity,
            stage_queue_capacity: p.stage_queue_capacity,
            endorsement_timeout: Duration::from_millis(p.endorsement_timeout_ms),
            max_duration: (p.max_duration_secs > 0).then(|| Duration::from_secs(p.max_duration_secs)),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        channel = "mychannel"
        chaincode = "basic"
        mspid = "Org1MSP"
        private_key = "keys/priv_sk"
        sign_cert = "keys/cert.pem"

        [[endorsers]]
        addr = "peer0:7051"

        [committer]
        addr = "peer0:7051"

        [orderer]
        addr = "orderer:7050"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config: BenchConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.num_of_conn, 1);
        assert_eq!(config.pipeline.signer_workers, 5);
        assert_eq!(config.pipeline.raw_queue_capacity, 100);
        assert_eq!(config.version, "");

        let pipeline = config.to_pipeline_config().unwrap();
        assert_eq!(pipeline.max_duration, None);
        assert_eq!(pipeline.endorsement_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_relative_paths_without_base_dir() {
        let config: BenchConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.private_key_path(), PathBuf::from("keys/priv_sk"));
    }

    #[test]
    fn test_bad_template_rejected() {
        let mut config: BenchConfig = toml::from_str(MINIMAL).unwrap();
        config.args = vec!["randomNumber5_".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_connections_rejected() {
        let mut config: BenchConfig = toml::from_str(MINIMAL).unwrap();
        config.client_per_conn = 0;
        assert!(config.validate().is_err());
    }
}
