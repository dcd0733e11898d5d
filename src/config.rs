use std::time::Duration;

use tracing::trace;

use crate::codec::Day;
use crate::storage::PoolSettings;

/// Top-level configuration file
///
/// Every section is optional; an empty object `{}` is a valid config.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage descriptor, e.g. `sqlite://./energy.db` (falls back to
    /// `STORAGE_URI`)
    pub storage_uri: Option<String>,

    /// Connection pool for the SQL engines
    #[serde(default)]
    pub pool: PoolConfig,

    /// Periodic collection (optional - nothing is collected without it)
    pub collector: Option<CollectorConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        PoolSettings {
            max_connections: config.max_connections,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CollectorConfig {
    /// Namespace the collected records are stored under
    pub namespace: String,

    /// Seconds between two collection runs
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// First day to collect when the namespace holds no data yet
    pub default_start: Option<Day>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_interval() -> u64 {
    3600
}

impl Config {
    /// Resolve the storage descriptor: CLI flag, then file, then environment
    pub fn storage_uri(&self, from_cli: Option<&str>) -> String {
        from_cli
            .map(str::to_string)
            .or_else(|| self.storage_uri.clone())
            .unwrap_or_else(crate::util::get_storage_uri)
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
