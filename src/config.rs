//! # Configuration
//!
//! Layered configuration, merged in order:
//! - `quiver.toml` (base configuration)
//! - `quiver.local.toml` (git-ignored local overrides)
//! - Environment variables (`QUIVER_*` prefix, `__` section separator)
//!
//! ```toml
//! # quiver.toml
//! [query]
//! reader_handlers = 16
//! reader_handlers_type = "cpu"
//! query_concurrently = true
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```
//!
//! ```bash
//! QUIVER_QUERY__READER_HANDLERS=32
//! QUIVER_LOGGING__LEVEL=debug
//! ```

use crate::schema::TtlInfo;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query-core knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Size of the reader pool running per-partition plans.
    #[serde(default = "default_reader_handlers")]
    pub reader_handlers: usize,

    /// `"cpu"` (dedicated worker pool) or `"io"` (threads attached to the
    /// storage I/O pool). Unknown values fall back to `cpu` with a warning.
    #[serde(default = "default_reader_handlers_type")]
    pub reader_handlers_type: String,

    /// Dispatch partitions to the reader pool for every request, not just
    /// those asking for it.
    #[serde(default)]
    pub query_concurrently: bool,

    /// Hard cap on edges returned per source vertex, applied on top of any
    /// per-request limit. `0` = uncapped.
    #[serde(default)]
    pub max_edge_returned_per_vertex: i64,

    /// Poll the kill registry every N rows; `0` polls on every row.
    #[serde(default = "default_kill_frequency")]
    pub check_plan_killed_frequency: u32,

    /// Testing hook: force this column as the TTL column of every schema.
    #[serde(default)]
    pub mock_ttl_col: String,

    /// Testing hook: TTL duration (seconds) used with `mock_ttl_col`.
    #[serde(default)]
    pub mock_ttl_duration: i64,
}

fn default_reader_handlers() -> usize {
    num_cpus::get()
}

fn default_reader_handlers_type() -> String {
    "cpu".to_string()
}

fn default_kill_frequency() -> u32 {
    8
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            reader_handlers: default_reader_handlers(),
            reader_handlers_type: default_reader_handlers_type(),
            query_concurrently: false,
            max_edge_returned_per_vertex: 0,
            check_plan_killed_frequency: default_kill_frequency(),
            mock_ttl_col: String::new(),
            mock_ttl_duration: 0,
        }
    }
}

impl QueryConfig {
    /// The mock TTL override, when both hooks are set.
    pub fn mock_ttl(&self) -> Option<TtlInfo> {
        if self.mock_ttl_col.is_empty() || self.mock_ttl_duration <= 0 {
            return None;
        }
        Some(TtlInfo { col: self.mock_ttl_col.clone(), duration_secs: self.mock_ttl_duration })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for daily-rolling log files; stderr when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format(), dir: None }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. quiver.toml (base configuration)
    /// 2. quiver.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (QUIVER_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("quiver.toml"))
            .merge(Toml::file("quiver.local.toml"))
            .merge(Env::prefixed("QUIVER_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUIVER_").split("__"))
            .extract()
    }
}
