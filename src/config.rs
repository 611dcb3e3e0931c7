//! Configuration module for pta-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the file server
#[derive(Parser, Debug)]
#[command(name = "pta-server")]
#[command(author = "pta-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented TCP file-sharing server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:11550)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Path to the user list (one username per line)
    #[arg(short = 'u', long = "users")]
    pub users_file: Option<PathBuf>,

    /// Directory whose files are served
    #[arg(short = 'd', long = "files")]
    pub files_dir: Option<PathBuf>,

    /// Listen backlog for pending connections
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Maximum concurrent sessions (1 = strictly sequential)
    #[arg(short = 's', long)]
    pub max_sessions: Option<usize>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Seconds to wait for in-flight sessions on shutdown (0 = abort)
    #[arg(long)]
    pub shutdown_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Drain timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            max_sessions: default_max_sessions(),
            workers: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Storage-related configuration
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// User list source
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
    /// Served directory
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
            files_dir: default_files_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:11550".to_string()
}

fn default_backlog() -> i32 {
    2
}

fn default_max_sessions() -> usize {
    64
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_users_file() -> PathBuf {
    PathBuf::from("./users.txt")
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("./files")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub users_file: PathBuf,
    pub files_dir: PathBuf,
    pub backlog: i32,
    pub max_sessions: usize,
    pub workers: Option<usize>,
    pub shutdown_timeout: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            users_file: cli.users_file.unwrap_or(toml_config.storage.users_file),
            files_dir: cli.files_dir.unwrap_or(toml_config.storage.files_dir),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            max_sessions: cli.max_sessions.unwrap_or(toml_config.server.max_sessions),
            workers: cli.workers.or(toml_config.server.workers),
            shutdown_timeout: cli
                .shutdown_timeout
                .unwrap_or(toml_config.server.shutdown_timeout),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        if config.max_sessions == 0 {
            return Err(ConfigError::Invalid("max_sessions must be at least 1"));
        }
        if config.max_sessions > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid("max_sessions is too large"));
        }
        if config.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1"));
        }

        Ok(config)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
