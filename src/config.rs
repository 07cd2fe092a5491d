//! Run configuration.
//!
//! A single JSON run-config file is parsed at startup and layered with
//! environment overrides. Validation happens once here; past this boundary
//! fields are non-optional unless documented otherwise.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors; any of these at startup is unrecoverable (exit 1).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("cannot read run config {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse run config {path}: {source}")]
    Unparseable {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Store backend of one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DbConnection {
    Sqlite { db_path: PathBuf },
    Postgres { url: String },
}

/// Per-platform store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbSettings {
    /// Defaults to a SQLite store at `<data_dir>/<platform>.sqlite`.
    #[serde(default)]
    pub db_connection: Option<DbConnection>,
    /// Test mode forces the built-in fixture adapter for the platform.
    #[serde(default)]
    pub test_mode: bool,
}

/// Per-platform client settings, one block per `clients.<platform>` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    /// Opaque secret/key map handed to the adapter untouched.
    #[serde(default)]
    pub auth_config: BTreeMap<String, String>,
    #[serde(default)]
    pub db_config: DbSettings,
    /// Base pacing delay between two tasks, seconds.
    #[serde(default)]
    pub request_delay: u64,
    /// Upper bound of the random pacing jitter, seconds.
    #[serde(default)]
    pub delay_randomize: u64,
    /// When false the platform is booted but skipped by the collection loop.
    #[serde(default = "default_true")]
    pub progress: bool,
    /// Skip the quota halt persisted by a previous run, once.
    #[serde(default)]
    pub ignore_initial_quota_halt: bool,
    /// Adapter symbol when it differs from the platform symbol.
    #[serde(default)]
    pub adapter: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            auth_config: BTreeMap::new(),
            db_config: DbSettings::default(),
            request_delay: 0,
            delay_randomize: 0,
            progress: true,
            ignore_initial_quota_halt: false,
            adapter: None,
        }
    }
}

/// Downstream sink for newly-added posts; best-effort only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkSettings {
    #[serde(default = "default_sink_host")]
    pub host: String,
    #[serde(default = "default_sink_port")]
    pub port: u16,
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SinkSettings {
    pub fn endpoint(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("{}:{}/{}", self.host, self.port, path)
    }
}

/// The complete run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Inbound task-file directory; defaults to `<data_dir>/tasks`.
    #[serde(default)]
    pub tasks_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/processed_tasks`.
    #[serde(default)]
    pub processed_tasks_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/main.sqlite`.
    #[serde(default)]
    pub meta_db_path: Option<PathBuf>,
    /// Defaults to `<data_dir>/platform_quotas.json`.
    #[serde(default)]
    pub quota_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub move_processed_tasks: bool,
    /// Sleep between two collection passes in `run_collect_loop`, seconds.
    #[serde(default = "default_collect_interval")]
    pub collect_interval_secs: u64,
    #[serde(default)]
    pub sink: Option<SinkSettings>,
    /// Platform symbol -> client settings; BTreeMap keeps boot order stable.
    pub clients: BTreeMap<String, ClientSettings>,
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_collect_interval() -> u64 {
    300
}

fn default_sink_host() -> String {
    "http://localhost".to_string()
}

fn default_sink_port() -> u16 {
    8800
}

impl RunConfig {
    /// Load from an explicit path, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: RunConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Unparseable {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from the `RUN_CONFIG` environment variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("RUN_CONFIG")
            .map_err(|_| ConfigError::MissingRequired("RUN_CONFIG".to_string()))?;
        Self::load(Path::new(&path))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("MOVE_PROCESSED_TASKS") {
            self.move_processed_tasks = v;
        }
        if let Some(v) = env_bool("SEND_TASK_POSTS") {
            if let Some(sink) = self.sink.as_mut() {
                sink.enabled = v;
            }
        }
        if let Ok(v) = std::env::var("COLLECT_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.collect_interval_secs = secs;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.clients.is_empty() {
            return Err(ConfigError::MissingRequired("clients".to_string()));
        }
        for platform in self.clients.keys() {
            if platform.is_empty() || platform.len() > 20 {
                return Err(ConfigError::InvalidValue {
                    key: "clients".to_string(),
                    message: format!("platform symbol '{platform}' must be 1..=20 chars"),
                });
            }
            if !platform
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                return Err(ConfigError::InvalidValue {
                    key: format!("clients.{platform}"),
                    message: "platform symbols are lowercase tokens".to_string(),
                });
            }
        }
        if self.collect_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "collect_interval_secs".to_string(),
                message: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.tasks_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tasks"))
    }

    pub fn processed_tasks_dir(&self) -> PathBuf {
        self.processed_tasks_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("processed_tasks"))
    }

    pub fn meta_db_path(&self) -> PathBuf {
        self.meta_db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("main.sqlite"))
    }

    pub fn quota_file(&self) -> PathBuf {
        self.quota_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("platform_quotas.json"))
    }

    /// Resolve the store file of a platform. Only SQLite stores are served
    /// by this process; a configured Postgres connection is rejected here.
    pub fn platform_db_path(&self, platform: &str) -> Result<PathBuf, ConfigError> {
        let connection = self
            .clients
            .get(platform)
            .and_then(|c| c.db_config.db_connection.clone());
        match connection {
            None => Ok(self.data_dir.join(format!("{platform}.sqlite"))),
            Some(DbConnection::Sqlite { db_path }) => Ok(db_path),
            Some(DbConnection::Postgres { .. }) => Err(ConfigError::InvalidValue {
                key: format!("clients.{platform}.db_config.db_connection"),
                message: "postgres stores are not served by this process".to_string(),
            }),
        }
    }

    /// Create the data directories the orchestrator writes into.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.tasks_dir())?;
        std::fs::create_dir_all(self.processed_tasks_dir())?;
        Ok(())
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> RunConfig {
        serde_json::from_value(serde_json::json!({
            "clients": { "youtube": {} }
        }))
        .unwrap()
    }

    #[test]
    fn defaults_are_filled_in() {
        let config = minimal();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.tasks_dir(), PathBuf::from("data/tasks"));
        assert_eq!(config.meta_db_path(), PathBuf::from("data/main.sqlite"));
        assert_eq!(
            config.platform_db_path("youtube").unwrap(),
            PathBuf::from("data/youtube.sqlite")
        );
        assert!(config.clients["youtube"].progress);
    }

    #[test]
    fn explicit_sqlite_connection_overrides_the_default_path() {
        let config: RunConfig = serde_json::from_value(serde_json::json!({
            "clients": {
                "youtube": {
                    "db_config": {
                        "db_connection": { "kind": "sqlite", "db_path": "/srv/yt.sqlite" }
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(
            config.platform_db_path("youtube").unwrap(),
            PathBuf::from("/srv/yt.sqlite")
        );
    }

    #[test]
    fn postgres_connections_are_rejected_at_resolution() {
        let config: RunConfig = serde_json::from_value(serde_json::json!({
            "clients": {
                "youtube": {
                    "db_config": {
                        "db_connection": { "kind": "postgres", "url": "postgres://x" }
                    }
                }
            }
        }))
        .unwrap();
        assert!(config.platform_db_path("youtube").is_err());
    }

    #[test]
    fn rejects_uppercase_platform_symbols() {
        let config: RunConfig = serde_json::from_value(serde_json::json!({
            "clients": { "YouTube": {} }
        }))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn sink_endpoint_joins_host_port_path() {
        let sink: SinkSettings = serde_json::from_value(serde_json::json!({
            "host": "http://collector", "port": 9000, "path": "/ingest"
        }))
        .unwrap();
        assert_eq!(sink.endpoint(), "http://collector:9000/ingest");
    }
}
