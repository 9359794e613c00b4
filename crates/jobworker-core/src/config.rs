use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8985;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000; // dispatch cadence
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 30_000; // per stream, logged output only

/// Top-level config (jobworker.toml + JOBWORKER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Save directory; each job runs in `<root>/<job_id>/<file_code>`.
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
            port: DEFAULT_PORT,
        }
    }
}

/// Static job definition source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// JSON file holding an array of job definitions, loaded at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Captured stdout/stderr longer than this is middle-truncated in logs.
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_max_output_chars() -> usize {
    DEFAULT_MAX_OUTPUT_CHARS
}
fn default_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.jobworker/jobs", home)
}

impl WorkerConfig {
    /// Load config from a TOML file with JOBWORKER_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `JOBWORKER_DRIVER__TICK_INTERVAL_MS=500`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.jobworker/jobworker.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: WorkerConfig = Figment::from(Serialized::defaults(WorkerConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("JOBWORKER_").split("__"))
            .extract()
            .map_err(|e| crate::error::WorkerError::Config(e.to_string()))?;

        if config.driver.tick_interval_ms == 0 {
            return Err(crate::error::WorkerError::Config(
                "driver.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.jobworker/jobworker.toml", home)
}
