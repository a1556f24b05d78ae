//! Server configuration loading from file, environment variables and CLI flags.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use worklog_types::{DEFAULT_INTAKE_CAPACITY, DEFAULT_MAILBOX_CAPACITY};

use crate::broadcast::BroadcastSettings;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding `index.html` and the viewer assets.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "worklog_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// How ingest requests are authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Per-user tokens issued by `POST /users`.
    #[default]
    Users,
    /// One shared secret, no user directory.
    Shared,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Shared secret; required in `shared` mode, ignored otherwise.
    #[serde(default)]
    pub token: Option<String>,
}

/// Ingest pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Normalize tags in shared mode. Users mode always normalizes.
    #[serde(default = "default_true")]
    pub normalize_tags: bool,
}

/// Live fanout configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// How long a deferred publish waits for intake space.
    #[serde(default = "default_retry_timeout_ms")]
    pub retry_timeout_ms: u64,

    /// Upper bound on concurrently deferred publishes.
    #[serde(default = "default_max_pending_retries")]
    pub max_pending_retries: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_db_path() -> String {
    "worklog.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_intake_capacity() -> usize {
    DEFAULT_INTAKE_CAPACITY
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

fn default_retry_timeout_ms() -> u64 {
    5_000
}

fn default_max_pending_retries() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            normalize_tags: true,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            intake_capacity: default_intake_capacity(),
            mailbox_capacity: default_mailbox_capacity(),
            retry_timeout_ms: default_retry_timeout_ms(),
            max_pending_retries: default_max_pending_retries(),
        }
    }
}

impl BroadcastConfig {
    pub fn settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            intake_capacity: self.intake_capacity,
            retry_timeout: Duration::from_millis(self.retry_timeout_ms),
            max_pending_retries: self.max_pending_retries,
        }
    }
}

impl Config {
    /// The socket address to listen on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    /// Applies `--addr` and `--token` command-line overrides.
    ///
    /// A token selects shared-secret mode.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAddr` if `addr` cannot be parsed.
    pub fn apply_cli(&mut self, addr: Option<&str>, token: Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = addr {
            let addr = parse_listen_addr(addr)?;
            self.server.host = addr.ip();
            self.server.port = addr.port();
        }
        if let Some(token) = token {
            self.auth.mode = AuthMode::Shared;
            self.auth.token = Some(token);
        }
        Ok(())
    }

    /// Checks cross-field constraints that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingSharedToken` in shared mode without a token.
    /// - `ConfigError::Invalid` for zero-sized queues.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.mode == AuthMode::Shared
            && self.auth.token.as_deref().map_or(true, |t| t.is_empty())
        {
            return Err(ConfigError::MissingSharedToken);
        }
        if self.broadcast.intake_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.intake_capacity must be positive".to_string(),
            ));
        }
        if self.broadcast.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.mailbox_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses a listen address. `":8080"` binds every interface.
///
/// # Errors
///
/// Returns `ConfigError::InvalidAddr` for anything that is neither
/// `host:port` nor `:port`.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::InvalidAddr(addr.to_string());
    match addr.strip_prefix(':') {
        Some(port) => {
            let port = port.parse().map_err(|_| invalid())?;
            Ok(SocketAddr::new(default_host(), port))
        }
        None => addr.parse().map_err(|_| invalid()),
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A listen address could not be parsed.
    #[error("invalid listen address: {0}")]
    InvalidAddr(String),

    /// Shared mode was selected without a secret.
    #[error("auth.mode = \"shared\" requires a token (--token or WORKLOG_TOKEN)")]
    MissingSharedToken,

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `WORKLOG_HOST` overrides `server.host`
/// - `WORKLOG_PORT` overrides `server.port`
/// - `WORKLOG_STATIC_DIR` overrides `server.static_dir`
/// - `WORKLOG_DB_PATH` overrides `database.path`
/// - `WORKLOG_LOG_LEVEL` overrides `logging.level`
/// - `WORKLOG_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `WORKLOG_TOKEN` sets `auth.token` and selects shared mode
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("WORKLOG_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("WORKLOG_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(dir) = std::env::var("WORKLOG_STATIC_DIR") {
        config.server.static_dir = PathBuf::from(dir);
    }
    if let Ok(db_path) = std::env::var("WORKLOG_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("WORKLOG_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("WORKLOG_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(token) = std::env::var("WORKLOG_TOKEN") {
        if !token.is_empty() {
            config.auth.mode = AuthMode::Shared;
            config.auth.token = Some(token);
        }
    }

    Ok(config)
}
