use std::collections::HashSet;
use std::time::Duration;

use duplex_sync::SyncOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// External clusters registered in the store at start-up
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Sync validations
        if self.sync.database.trim().is_empty() {
            return Err("sync.database must not be empty".into());
        }
        if self.sync.kind.trim().is_empty() {
            return Err("sync.kind must not be empty".into());
        }
        if self.sync.handler_timeout_ms == 0 {
            return Err("sync.handler_timeout_ms must be > 0".into());
        }
        if self.sync.max_in_flight == 0 {
            return Err("sync.max_in_flight must be > 0".into());
        }
        if self.sync.retry_delay_ms == 0 {
            return Err("sync.retry_delay_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Cluster validations
        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.trim().is_empty() {
                return Err("clusters[].name must not be empty".into());
            }
            if !seen.insert(cluster.name.as_str()) {
                return Err(format!("duplicate cluster name: {}", cluster.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_true")]
    pub serialize_per_record: bool,
    #[serde(default = "default_true")]
    pub resync_on_start: bool,
    /// Pause before retrying a failed fan-in
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_database() -> String {
    "duplex".into()
}
fn default_kind() -> String {
    "SecurityGroup".into()
}
fn default_channel_capacity() -> usize {
    128
}
fn default_handler_timeout_ms() -> u64 {
    30_000
}
fn default_max_in_flight() -> usize {
    64
}
fn default_true() -> bool {
    true
}
fn default_retry_delay_ms() -> u64 {
    5_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            kind: default_kind(),
            channel_capacity: default_channel_capacity(),
            handler_timeout_ms: default_handler_timeout_ms(),
            max_in_flight: default_max_in_flight(),
            serialize_per_record: true,
            resync_on_start: true,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SyncConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn to_options(&self) -> SyncOptions {
        SyncOptions {
            database: self.database.clone(),
            kind: self.kind.clone(),
            channel_capacity: self.channel_capacity,
            handler_timeout: self.handler_timeout(),
            max_in_flight: self.max_in_flight,
            serialize_per_record: self.serialize_per_record,
            resync_on_start: self.resync_on_start,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Colored output
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Prefix events with their module path
    #[serde(default = "default_true")]
    pub with_target: bool,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
            with_target: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub description: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "duplex.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., DUPLEX__SYNC__MAX_IN_FLIGHT=8
        builder = builder.add_source(
            Environment::with_prefix("DUPLEX")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
