//! Configuration module
//!
//! Handles loading and saving stenowire configuration.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::protocol::{DEFAULT_DISK, MAX_READ, REALTIME_FILE};
use crate::transport::{WifiConfig, BROADCAST_PORT, WRITER_PORT};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid writer address: {0}")]
    InvalidAddress(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Wi-Fi transport settings
    #[serde(default)]
    pub wifi: WifiSection,

    /// Read loop settings
    #[serde(default)]
    pub reader: ReaderSection,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log file path (optional)
    pub log_file: Option<PathBuf>,
}

/// Wi-Fi transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiSection {
    /// Writer IP address; discovery broadcast is skipped when set
    pub address: Option<String>,
    /// Port for the discovery broadcast
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,
    /// TCP port the writer serves the protocol on
    #[serde(default = "default_writer_port")]
    pub port: u16,
    /// Overall discovery budget in ms
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_ms: u64,
    /// TCP connect timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Per-exchange timeout in ms
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_ms: u64,
}

fn default_broadcast_port() -> u16 {
    BROADCAST_PORT
}

fn default_writer_port() -> u16 {
    WRITER_PORT
}

fn default_discovery_timeout() -> u64 {
    10_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_exchange_timeout() -> u64 {
    3_000
}

impl Default for WifiSection {
    fn default() -> Self {
        Self {
            address: None,
            broadcast_port: default_broadcast_port(),
            port: default_writer_port(),
            discovery_timeout_ms: default_discovery_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            exchange_timeout_ms: default_exchange_timeout(),
        }
    }
}

/// Read loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderSection {
    /// File to open on the writer
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Disk hosting the file
    #[serde(default = "default_disk_id")]
    pub disk_id: Option<char>,
    /// Bytes requested per read, capped at the protocol ceiling
    #[serde(default = "default_read_size")]
    pub read_size: u32,
    /// Delay between reconnect attempts in ms
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,
    /// Pacing between reads once caught up to the live tail, in ms
    #[serde(default = "default_realtime_poll")]
    pub realtime_poll_ms: u64,
}

fn default_file_name() -> String {
    REALTIME_FILE.to_string()
}

fn default_disk_id() -> Option<char> {
    Some(DEFAULT_DISK)
}

fn default_read_size() -> u32 {
    MAX_READ
}

fn default_reconnect_interval() -> u64 {
    250
}

fn default_realtime_poll() -> u64 {
    100
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            disk_id: default_disk_id(),
            read_size: default_read_size(),
            reconnect_interval_ms: default_reconnect_interval(),
            realtime_poll_ms: default_realtime_poll(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("stenowire/config.toml")),
            Some(PathBuf::from("./stenowire.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build the transport settings, resolving the configured address
    pub fn wifi_config(&self) -> ConfigResult<WifiConfig> {
        let address = match &self.wifi.address {
            Some(s) => Some(
                s.parse::<IpAddr>()
                    .map_err(|_| ConfigError::InvalidAddress(s.clone()))?,
            ),
            None => None,
        };

        Ok(WifiConfig {
            address,
            broadcast_port: self.wifi.broadcast_port,
            port: self.wifi.port,
            discovery_timeout_ms: self.wifi.discovery_timeout_ms,
            connect_timeout_ms: self.wifi.connect_timeout_ms,
            exchange_timeout_ms: self.wifi.exchange_timeout_ms,
            ..Default::default()
        })
    }

    /// Build the engine settings
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            file_name: self.reader.file_name.clone(),
            disk_id: self.reader.disk_id,
            read_size: self.reader.read_size.min(MAX_READ),
            reconnect_interval_ms: self.reader.reconnect_interval_ms,
            realtime_poll_ms: self.reader.realtime_poll_ms,
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        wifi: WifiSection {
            address: Some("192.168.1.42".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    toml::to_string_pretty(&config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.wifi.broadcast_port, BROADCAST_PORT);
        assert_eq!(config.reader.file_name, REALTIME_FILE);
        assert_eq!(config.reader.read_size, MAX_READ);
    }

    #[test]
    fn test_save_and_load() {
        let config = Config::default();
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.wifi.port, config.wifi.port);
        assert_eq!(loaded.reader.disk_id, Some('A'));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.wifi.address.as_deref(), Some("192.168.1.42"));
    }

    #[test]
    fn test_wifi_config_rejects_bad_address() {
        let config = Config {
            wifi: WifiSection {
                address: Some("not an ip".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.wifi_config(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_engine_config_caps_read_size() {
        let config = Config {
            reader: ReaderSection {
                read_size: 0x10_000,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.engine_config().read_size, MAX_READ);
    }
}
