//! Layered configuration for livedesk.
//!
//! Settings resolve in this order, later layers winning:
//! defaults → `.livedesk/livedesk.toml` (or `--config`) → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 5080
//! cors_origins = ["http://localhost:3000"]
//! dev = false
//!
//! [database]
//! path = ".livedesk/livedesk.db"
//! seed = false
//!
//! [realtime]
//! channel_capacity = 256
//! ping_interval_secs = 30
//! pong_timeout_secs = 60
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```
//!
//! Environment overrides: `LIVEDESK_HOST`, `LIVEDESK_PORT`, `LIVEDESK_DB_PATH`
//! and `LIVEDESK_CORS_ORIGINS` (comma-separated).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::desk::ws::Keepalive;

/// Directory holding the config file and, by default, the database.
pub const DESK_DIR: &str = ".livedesk";
pub const CONFIG_FILE: &str = "livedesk.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, coloured when attached to a terminal
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty with `dev = true` means permissive.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub dev: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            dev: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Insert starter agents and tickets into an empty database
    #[serde(default)]
    pub seed: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DESK_DIR).join("livedesk.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            seed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeSection {
    /// Frames buffered per live client before it starts lagging
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_pong_timeout_secs() -> u64 {
    60
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Parsed `livedesk.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeskConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub realtime: RealtimeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Flags from the command line that override file and environment values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
    pub seed: bool,
}

impl DeskConfig {
    /// Default config file location relative to the working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from(DESK_DIR).join(CONFIG_FILE)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse livedesk.toml")
    }

    /// Load from `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize livedesk.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// File and environment layers. An explicit `path` must exist; the
    /// default location is optional.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::load_or_default(&Self::default_path())?,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LIVEDESK_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("LIVEDESK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LIVEDESK_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid LIVEDESK_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("LIVEDESK_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(origins) = lookup("LIVEDESK_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(path) = &cli.db_path {
            self.database.path = path.clone();
        }
        if cli.dev {
            self.server.dev = true;
        }
        if cli.seed {
            self.database.seed = true;
        }
    }

    pub fn keepalive(&self) -> Keepalive {
        Keepalive {
            ping_interval: Duration::from_secs(self.realtime.ping_interval_secs),
            pong_timeout: Duration::from_secs(self.realtime.pong_timeout_secs),
        }
    }

    /// Validate the configuration and return any problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.port == 0 {
            problems.push("server.port must be between 1 and 65535".to_string());
        }
        if self.server.host.trim().is_empty() {
            problems.push("server.host must not be empty".to_string());
        }
        for origin in &self.server.cors_origins {
            if !is_valid_origin(origin) {
                problems.push(format!(
                    "Invalid CORS origin '{}': expected scheme://host[:port]",
                    origin
                ));
            }
        }
        if self.realtime.channel_capacity == 0 {
            problems.push("realtime.channel_capacity must be at least 1".to_string());
        }
        if self.realtime.ping_interval_secs == 0 {
            problems.push("realtime.ping_interval_secs must be at least 1".to_string());
        }
        if self.realtime.pong_timeout_secs <= self.realtime.ping_interval_secs {
            problems.push(format!(
                "realtime.pong_timeout_secs ({}) must be greater than ping_interval_secs ({})",
                self.realtime.pong_timeout_secs, self.realtime.ping_interval_secs
            ));
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            problems.push(format!("Invalid logging.level '{}'", self.logging.level));
        }

        problems
    }
}

/// Origins are compared verbatim by browsers, so no path or trailing slash.
fn is_valid_origin(origin: &str) -> bool {
    let rest = match origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    {
        Some(rest) => rest,
        None => return false,
    };
    !rest.is_empty()
        && !rest.contains('/')
        && axum::http::HeaderValue::from_str(origin).is_ok()
}
