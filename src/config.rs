//! Layered configuration: built-in defaults, an optional TOML file, then
//! CLI flags, each overriding the last.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_UDP_PORT: u16 = 5056;
const DEFAULT_BIND_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const DEFAULT_BIND_PORT: u16 = 7777;
const DEFAULT_MAX_SUBSCRIBERS: usize = 100;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 16;
const MIN_FLUSH_INTERVAL_MS: u64 = 5;
const MAX_FLUSH_INTERVAL_MS: u64 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Fully resolved configuration: defaults < file < CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub udp_port: u16,
    pub bind_addr: SocketAddr,
    pub max_subscribers: usize,
    pub flush_interval_ms: u64,
    pub app_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub ip_override: Option<String>,
    pub dev: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            udp_port: DEFAULT_UDP_PORT,
            bind_addr: SocketAddr::new(IpAddr::V4(DEFAULT_BIND_ADDR), DEFAULT_BIND_PORT),
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            app_dir: PathBuf::from("."),
            logs_dir: PathBuf::from("./logs"),
            ip_override: None,
            dev: false,
        }
    }
}

/// Raw TOML shape. Every field optional; absent fields keep the prior
/// (default or already-loaded) value.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    udp_port: Option<u16>,
    bind_addr: Option<String>,
    max_subscribers: Option<usize>,
    flush_interval_ms: Option<u64>,
    app_dir: Option<String>,
    logs_dir: Option<String>,
}

/// CLI-sourced overrides, applied last. `None` fields leave the
/// file/default value untouched.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub ip: Option<String>,
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub dev: bool,
}

/// Loads configuration from an optional TOML file, then applies CLI
/// overrides on top.
pub fn load(overrides: &CliOverrides) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(path) = &overrides.config_path {
        apply_file(&mut config, path)?;
    }

    apply_cli(&mut config, overrides)?;
    Ok(config)
}

fn apply_file(config: &mut Config, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(port) = raw.udp_port {
        config.udp_port = port;
    }
    if let Some(addr) = raw.bind_addr {
        config.bind_addr = addr.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind_addr".to_owned(),
            reason: addr,
        })?;
    }
    if let Some(max) = raw.max_subscribers {
        config.max_subscribers = max;
    }
    if let Some(ms) = raw.flush_interval_ms {
        validate_flush_interval(ms)?;
        config.flush_interval_ms = ms;
    }
    if let Some(dir) = raw.app_dir {
        config.app_dir = PathBuf::from(dir);
    }
    if let Some(dir) = raw.logs_dir {
        config.logs_dir = PathBuf::from(dir);
    }

    Ok(())
}

fn apply_cli(config: &mut Config, overrides: &CliOverrides) -> Result<(), ConfigError> {
    if let Some(ip) = &overrides.ip {
        config.ip_override = Some(ip.clone());
    }
    if let Some(port) = overrides.port {
        config.bind_addr.set_port(port);
    }
    config.dev = overrides.dev;
    Ok(())
}

fn validate_flush_interval(ms: u64) -> Result<(), ConfigError> {
    if !(MIN_FLUSH_INTERVAL_MS..=MAX_FLUSH_INTERVAL_MS).contains(&ms) {
        return Err(ConfigError::InvalidValue {
            field: "flush_interval_ms".to_owned(),
            reason: format!(
                "must be between {MIN_FLUSH_INTERVAL_MS} and {MAX_FLUSH_INTERVAL_MS}, got {ms}"
            ),
        });
    }
    Ok(())
}
