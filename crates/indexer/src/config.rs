use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use stream::{MAX_RECONNECT_ATTEMPTS, RECONNECT_INTERVAL};
use sync::backfill::HISTORICAL_SYNC_BLOCKS;
use sync::tracker::HEIGHT_CACHE_TTL;
use thiserror::Error;

pub const REGISTRY_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// CLI STRUCTS
// ============================================================================

/// Streaming block and checkpoint indexer for CometBFT chains.
#[derive(Parser, Debug, Default)]
#[command(name = "indexer", version = "0.1.0")]
pub struct Cli {
    /// Path to TOML configuration file.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Directory for the persisted height cache.
    #[arg(long = "datadir")]
    pub datadir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

// ============================================================================
// CONFIG FILE STRUCTS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub name: String,
    /// Websocket endpoints, primary first.
    #[serde(default)]
    pub stream_urls: Vec<String>,
    /// CometBFT RPC endpoints, paired by index with `rest_urls`.
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub rest_urls: Vec<String>,
}

/// Configuration loaded from TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default, with = "humantime_serde")]
    pub reconnect_interval: Option<Duration>,
    pub max_reconnect_attempts: Option<u32>,
    pub historical_sync_blocks: Option<u64>,
    pub checkpoint_sync: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    pub height_cache_ttl: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub registry_refresh_interval: Option<Duration>,
    pub datadir: Option<String>,
    pub log_level: Option<String>,
}

// ============================================================================
// RUNTIME CONFIG
// ============================================================================

/// Final merged configuration for runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub networks: Vec<NetworkConfig>,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub historical_sync_blocks: u64,
    pub checkpoint_sync: bool,
    pub height_cache_ttl: Duration,
    pub registry_refresh_interval: Duration,
    pub datadir: PathBuf,
    pub log_level: String,
}

impl RuntimeConfig {
    /// Merge CLI args with config file. Precedence: CLI > config file > defaults.
    pub fn from_cli_and_file(cli: &Cli, file: ConfigFile) -> Result<Self, ConfigError> {
        if file.networks.is_empty() {
            return Err(ConfigError::MissingRequired("networks"));
        }
        for net in &file.networks {
            validate_network(net)?;
        }

        let datadir = cli
            .datadir
            .clone()
            .or_else(|| file.datadir.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data"));

        let log_level = cli
            .log_level
            .clone()
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string());

        Ok(RuntimeConfig {
            networks: file.networks,
            reconnect_interval: file.reconnect_interval.unwrap_or(RECONNECT_INTERVAL),
            max_reconnect_attempts: file
                .max_reconnect_attempts
                .unwrap_or(MAX_RECONNECT_ATTEMPTS),
            historical_sync_blocks: file
                .historical_sync_blocks
                .unwrap_or(HISTORICAL_SYNC_BLOCKS),
            checkpoint_sync: file.checkpoint_sync.unwrap_or(true),
            height_cache_ttl: file.height_cache_ttl.unwrap_or(HEIGHT_CACHE_TTL),
            registry_refresh_interval: file
                .registry_refresh_interval
                .unwrap_or(REGISTRY_REFRESH_INTERVAL),
            datadir,
            log_level,
        })
    }
}

fn validate_network(net: &NetworkConfig) -> Result<(), ConfigError> {
    if net.name.is_empty() {
        return Err(ConfigError::Invalid("network with empty name".into()));
    }
    if net.stream_urls.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "network {}: stream_urls is empty",
            net.name
        )));
    }
    if net.rpc_urls.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "network {}: rpc_urls is empty",
            net.name
        )));
    }
    if net.rpc_urls.len() != net.rest_urls.len() {
        return Err(ConfigError::Invalid(format!(
            "network {}: {} rpc_urls but {} rest_urls",
            net.name,
            net.rpc_urls.len(),
            net.rest_urls.len()
        )));
    }
    Ok(())
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required in the config file")]
    MissingRequired(&'static str),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

// ============================================================================
// LOADING FUNCTIONS
// ============================================================================

/// Load TOML config file, returns default if path is None.
pub fn load_config_file(path: Option<&PathBuf>) -> Result<ConfigFile, ConfigError> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)?;
            toml::from_str(&content).map_err(ConfigError::Toml)
        }
        None => Ok(ConfigFile::default()),
    }
}
