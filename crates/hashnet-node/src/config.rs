//! Configuration for hashnet-node

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Ledger gateway configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Asset store configuration
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Workload runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Poll and heartbeat intervals
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Session store configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Host identity and registration payload
    #[serde(default)]
    pub host: HostConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LedgerConfig {
    /// Simulated ledger held in memory (for development/testing)
    Memory,

    /// Signing relay reached over HTTP
    Relay {
        /// Base URL of the relay
        #[serde(default = "default_relay_url")]
        url: String,
    },
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig::Memory
    }
}

/// Asset store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Content-addressed store gateway
    #[serde(default = "default_ipfs_node_url")]
    pub ipfs_node_url: String,

    /// Root directory for manifests and workload assets
    #[serde(default = "default_work_directory")]
    pub work_directory: PathBuf,

    /// Model upload directory removed on decommission
    #[serde(default)]
    pub model_create_dir: Option<PathBuf>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            ipfs_node_url: default_ipfs_node_url(),
            work_directory: default_work_directory(),
            model_create_dir: None,
        }
    }
}

impl AssetsConfig {
    /// Directory train assets are fetched into.
    pub fn workspace_dir(&self) -> PathBuf {
        self.work_directory.join("ml-workspace")
    }
}

/// Workload runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Container CLI binary
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    /// Training workspace image
    #[serde(default = "default_workspace_image")]
    pub workspace_image: String,

    /// Deployment image
    #[serde(default = "default_deploy_image")]
    pub deploy_image: String,

    /// Benchmark image
    #[serde(default = "default_score_image")]
    pub score_image: String,

    /// Host port published by the training workspace
    #[serde(default = "default_workspace_port")]
    pub workspace_port: u16,

    /// Host port published by a deployment
    #[serde(default = "default_deploy_port")]
    pub deploy_port: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_binary: default_docker_binary(),
            workspace_image: default_workspace_image(),
            deploy_image: default_deploy_image(),
            score_image: default_score_image(),
            workspace_port: default_workspace_port(),
            deploy_port: default_deploy_port(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Controller poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Liveness submission interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session document path
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

/// Host identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// 16-byte machine UUID, hex encoded
    #[serde(default)]
    pub machine_uuid: String,

    /// Number of GPUs attached; zero runs workloads CPU-only
    #[serde(default)]
    pub gpu_count: u32,

    /// Public address advertised in the registration payload
    #[serde(default)]
    pub addr: String,

    /// Operator-supplied hardware description merged into registration
    #[serde(default)]
    pub registration: BTreeMap<String, serde_json::Value>,
}

impl HostConfig {
    pub fn gpu_present(&self) -> bool {
        self.gpu_count > 0
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_relay_url() -> String {
    "http://127.0.0.1:8899".to_string()
}

fn default_ipfs_node_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_work_directory() -> PathBuf {
    PathBuf::from("/data/hashnet")
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_workspace_image() -> String {
    "hashnet/ml-workspace:latest".to_string()
}

fn default_deploy_image() -> String {
    "hashnet/deploy:latest".to_string()
}

fn default_score_image() -> String {
    "hashnet/score:latest".to_string()
}

fn default_workspace_port() -> u16 {
    8888
}

fn default_deploy_port() -> u16 {
    7860
}

fn default_poll_interval() -> u64 {
    60
}

fn default_heartbeat_interval() -> u64 {
    6 * 60 * 60
}

fn default_session_path() -> PathBuf {
    PathBuf::from("/data/hashnet/session.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `HASHNET_*` environment variables (`__` separates sections).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&NodeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HASHNET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
