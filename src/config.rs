use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// sqlx connection URL for the configured path
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Node REST API the snapshot is read from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_node_url")]
    pub base_url: String,
    /// Sent as the `Rune` header
    #[serde(default)]
    pub rune: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_node_url(),
            rune: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_true")]
    pub run_on_start: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            run_on_start: true,
        }
    }
}

impl SchedulerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval(),
            run_on_start: self.run_on_start,
        }
    }
}

/// Event intake
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Names accepted by `POST /api/v1/events/:name`; anything else is dropped
    #[serde(default = "default_allowed_events")]
    pub allowed: Vec<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            allowed: default_allowed_events(),
        }
    }
}

fn default_allowed_events() -> Vec<String> {
    ["forward_event", "db_write", "htlc_accepted"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9733
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_database_path() -> String {
    "stats.sqlite3".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_node_url() -> String {
    "https://127.0.0.1:3010".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_interval_minutes() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

/// Load configuration from `path` (optional) and `GETSTATS__*` environment variables
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("GETSTATS").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.database.path.trim().is_empty() {
        anyhow::bail!("database.path cannot be empty");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be at least 1");
    }

    if cfg.scheduler.interval_minutes == 0 {
        anyhow::bail!("scheduler.interval_minutes must be at least 1");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Invalid server.log_format '{}': expected 'text' or 'json'", other),
    }

    if cfg.events.allowed.iter().any(|name| name.trim().is_empty()) {
        anyhow::bail!("events.allowed cannot contain empty names");
    }

    if cfg.collector.enabled {
        let url = &cfg.collector.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("collector.base_url must be an http(s) URL, got '{}'", url);
        }
        if cfg.collector.timeout_seconds == 0 {
            anyhow::bail!("collector.timeout_seconds must be at least 1");
        }
    }

    Ok(())
}
