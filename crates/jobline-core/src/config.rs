use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::JobDefinition;

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MISFIRE_THRESHOLD_SECS: u64 = 60;
pub const DEFAULT_JOBS_NAMESPACE: &str = "jobs";

/// Top-level config (jobline.toml + JOBLINE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoblineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Jobs registered when the daemon starts.
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on firings in the Running state at once.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Timer loop cadence. Cron precision is bounded by this value.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// A fire time observed later than this is treated as missed.
    #[serde(default = "default_misfire_threshold_secs")]
    pub misfire_threshold_secs: u64,
    /// Drain in-flight firings on shutdown instead of aborting them.
    #[serde(default = "bool_true")]
    pub wait_for_jobs_on_shutdown: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            misfire_threshold_secs: DEFAULT_MISFIRE_THRESHOLD_SECS,
            wait_for_jobs_on_shutdown: true,
        }
    }
}

/// How the component registry treats two components sharing a short name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateNamePolicy {
    /// Refuse the second registration.
    #[default]
    Reject,
    /// Accept it; resolution prefers the jobs namespace, then registration order.
    PreferNamespace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub duplicate_short_names: DuplicateNamePolicy,
    /// Namespace preferred when a short name is ambiguous.
    #[serde(default = "default_jobs_namespace")]
    pub jobs_namespace: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            duplicate_short_names: DuplicateNamePolicy::default(),
            jobs_namespace: default_jobs_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// When false, execution results are only logged, not persisted.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_db_path(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_misfire_threshold_secs() -> u64 {
    DEFAULT_MISFIRE_THRESHOLD_SECS
}
fn default_jobs_namespace() -> String {
    DEFAULT_JOBS_NAMESPACE.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.jobline/jobline.db", home)
}

impl JoblineConfig {
    /// Load config from a TOML file with JOBLINE_* env var overrides.
    ///
    /// The file is the explicit path argument if given, else
    /// `~/.jobline/jobline.toml`. Nested keys in env vars are separated by a
    /// double underscore: `JOBLINE_SCHEDULER__POOL_SIZE=4`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::JoblineError::Config(e.to_string()))
    }

    /// The provider stack used by [`JoblineConfig::load`].
    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("JOBLINE_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.jobline/jobline.toml", home)
}
