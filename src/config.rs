//! Configuration module for probe-relay.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::relay::{
    RelaySettings, DEFAULT_DATAGRAM_IDLE_TIMEOUT, DEFAULT_MAX_CONTROL_SIZE,
    DEFAULT_MAX_MESSAGE_SIZE,
};

/// Command-line arguments for the relay
#[derive(Parser, Debug, Default)]
#[command(name = "probe-relay")]
#[command(version = "0.1.0")]
#[command(
    about = "Sends a nonce to a target endpoint and echoes its traffic back",
    long_about = None
)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Protocol identifier (tcp, tcp4, tcp6, udp, udp4, udp6)
    #[arg(short, long)]
    pub protocol: Option<String>,

    /// Target IP address
    #[arg(short, long)]
    pub address: Option<String>,

    /// Target port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Nonce sent to the target before echoing
    #[arg(short, long)]
    pub nonce: Option<String>,

    /// Datagram idle timeout in milliseconds
    #[arg(long)]
    pub datagram_idle_timeout_ms: Option<u64>,

    /// Stream idle timeout in milliseconds (unset = wait for the target to close)
    #[arg(long)]
    pub stream_idle_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target endpoint; every field is required once CLI and file are merged
#[derive(Debug, Deserialize, Default)]
pub struct TargetConfig {
    pub protocol: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub nonce: Option<String>,
}

/// Relay tunables
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_datagram_idle_timeout_ms")]
    pub datagram_idle_timeout_ms: u64,
    pub stream_idle_timeout_ms: Option<u64>,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_max_control_size")]
    pub max_control_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            datagram_idle_timeout_ms: default_datagram_idle_timeout_ms(),
            stream_idle_timeout_ms: None,
            max_message_size: default_max_message_size(),
            max_control_size: default_max_control_size(),
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

fn default_datagram_idle_timeout_ms() -> u64 {
    DEFAULT_DATAGRAM_IDLE_TIMEOUT.as_millis() as u64
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_max_control_size() -> usize {
    DEFAULT_MAX_CONTROL_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub protocol: String,
    pub address: String,
    pub port: u16,
    pub nonce: String,
    pub settings: RelaySettings,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = match cli.config {
            Some(ref config_path) => {
                let contents = std::fs::read_to_string(config_path)
                    .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
            }
            None => TomlConfig::default(),
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn merge(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let target = file.target;
        let relay = file.relay;

        if relay.max_message_size == 0 {
            return Err(ConfigError::ZeroSize("max_message_size"));
        }
        if relay.max_control_size == 0 {
            return Err(ConfigError::ZeroSize("max_control_size"));
        }

        let settings = RelaySettings {
            datagram_idle_timeout: Duration::from_millis(
                cli.datagram_idle_timeout_ms
                    .unwrap_or(relay.datagram_idle_timeout_ms),
            ),
            stream_idle_timeout: cli
                .stream_idle_timeout_ms
                .or(relay.stream_idle_timeout_ms)
                .map(Duration::from_millis),
            max_message_size: relay.max_message_size,
            max_control_size: relay.max_control_size,
        };

        Ok(Config {
            protocol: cli
                .protocol
                .or(target.protocol)
                .ok_or(ConfigError::MissingField("protocol"))?,
            address: cli
                .address
                .or(target.address)
                .ok_or(ConfigError::MissingField("address"))?,
            port: cli
                .port
                .or(target.port)
                .ok_or(ConfigError::MissingField("port"))?,
            nonce: cli
                .nonce
                .or(target.nonce)
                .ok_or(ConfigError::MissingField("nonce"))?,
            settings,
            log_level: cli.log_level.unwrap_or(file.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("Missing required setting '{0}' (pass it on the command line or under [target])")]
    MissingField(&'static str),

    #[error("Setting '{0}' must be greater than zero")]
    ZeroSize(&'static str),
}
