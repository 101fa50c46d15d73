use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for state and downloads - computed from home, not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".fleetsync"),
            config_path: PathBuf::from(".fleetsync/config.toml"),
            backend: BackendConfig::default(),
            sync: SyncConfig::default(),
            artifacts: ArtifactsConfig::default(),
            push: PushConfig::default(),
            device: DeviceConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl Config {
    /// Path of the JSON state document (policy, identity, push state, jobs).
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Directory used for in-flight artifact downloads.
    pub fn download_dir(&self) -> PathBuf {
        self.artifacts
            .download_dir
            .as_deref()
            .map_or_else(|| self.data_dir.join("downloads"), PathBuf::from)
    }

    /// Directory the simulated package installer stages sessions into.
    pub fn packages_dir(&self) -> PathBuf {
        self.data_dir.join("packages")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://mdm.example.com/api/mdm".into()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Poll interval used until the backend sends one with a policy.
    #[serde(default = "default_poll_interval_secs")]
    pub default_poll_interval_secs: u64,
    /// Lower bound applied to any backend-provided poll interval.
    #[serde(default = "default_min_poll_interval_secs")]
    pub min_poll_interval_secs: u64,
    /// How many applied non-idempotent commands are remembered for redelivery.
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_min_poll_interval_secs() -> u64 {
    5
}

fn default_journal_capacity() -> usize {
    64
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_poll_interval_secs: default_poll_interval_secs(),
            min_poll_interval_secs: default_min_poll_interval_secs(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_max_artifact_bytes")]
    pub max_bytes: u64,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_max_artifact_bytes() -> u64 {
    crate::artifacts::DEFAULT_MAX_ARTIFACT_BYTES
}

fn default_read_timeout_secs() -> u64 {
    45
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_artifact_bytes(),
            download_dir: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_base_retry_ms")]
    pub base_retry_ms: u64,
    #[serde(default = "default_max_retry_ms")]
    pub max_retry_ms: u64,
    #[serde(default = "default_max_backoff_attempts")]
    pub max_backoff_attempts: u32,
    #[serde(default = "default_resync_after_secs")]
    pub resync_after_secs: u64,
    /// Package that produces push tokens and reads them back from its
    /// application restrictions.
    #[serde(default = "default_producer_package")]
    pub producer_package: String,
    /// JSON file the messaging client writes its current token into.
    #[serde(default)]
    pub token_file: Option<String>,
}

fn default_base_retry_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_max_retry_ms() -> u64 {
    6 * 60 * 60 * 1_000
}

fn default_max_backoff_attempts() -> u32 {
    10
}

fn default_resync_after_secs() -> u64 {
    24 * 60 * 60
}

fn default_producer_package() -> String {
    "com.example.pushcore".into()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            base_retry_ms: default_base_retry_ms(),
            max_retry_ms: default_max_retry_ms(),
            max_backoff_attempts: default_max_backoff_attempts(),
            resync_after_secs: default_resync_after_secs(),
            producer_package: default_producer_package(),
            token_file: None,
        }
    }
}

/// Settings for the in-process simulated device used when no platform
/// adapter is linked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_platform_level")]
    pub platform_level: u32,
    #[serde(default = "default_true")]
    pub device_owner: bool,
    #[serde(default)]
    pub organization_owned_profile: bool,
}

fn default_platform_level() -> u32 {
    34
}

fn default_true() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            platform_level: default_platform_level(),
            device_owner: true,
            organization_owned_profile: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_component_initial_backoff_secs")]
    pub component_initial_backoff_secs: u64,
    #[serde(default = "default_component_max_backoff_secs")]
    pub component_max_backoff_secs: u64,
    #[serde(default = "default_component_max_restarts")]
    pub component_max_restarts: u32,
    #[serde(default = "default_job_poll_secs")]
    pub job_poll_secs: u64,
}

fn default_component_initial_backoff_secs() -> u64 {
    2
}

fn default_component_max_backoff_secs() -> u64 {
    300
}

fn default_component_max_restarts() -> u32 {
    10
}

fn default_job_poll_secs() -> u64 {
    15
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            component_initial_backoff_secs: default_component_initial_backoff_secs(),
            component_max_backoff_secs: default_component_max_backoff_secs(),
            component_max_restarts: default_component_max_restarts(),
            job_poll_secs: default_job_poll_secs(),
        }
    }
}
