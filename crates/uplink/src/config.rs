//! TOML configuration for the hub and validator binaries.
//!
//! A missing config file is created with defaults on first start, so a
//! fresh install always leaves an editable file behind.

use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DEFAULT_HUB_PORT, DEFAULT_REWARD_PER_CHECK};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

/// Hub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub database: DatabaseConfig,
}

/// Listener for validator connections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

/// Periodic dispatch and reward accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Seconds between dispatch ticks
    pub period_seconds: u64,
    /// Reward accrued by a validator per accepted check
    pub reward_per_check: u64,
    /// Seconds a dispatched request may wait for its reply
    pub callback_ttl_seconds: u64,
    /// Seconds between sweeps of expired pending requests
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the local libsql database file
    pub path: String,
}

/// Validator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub hub: HubEndpoint,
    pub identity: IdentityConfig,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubEndpoint {
    /// WebSocket URL of the hub
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// File holding the validator's Ed25519 secret key.
    /// `UPLINK_SECRET_KEY` takes precedence when set.
    pub keypair_path: String,
    /// Address reported to the hub at signup
    pub origin_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: DEFAULT_HUB_PORT }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            period_seconds: 60,
            reward_per_check: DEFAULT_REWARD_PER_CHECK,
            callback_ttl_seconds: 120,
            sweep_interval_seconds: 10,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "uplink.db".into() }
    }
}

impl Default for HubEndpoint {
    fn default() -> Self {
        Self { url: format!("ws://127.0.0.1:{DEFAULT_HUB_PORT}") }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { keypair_path: "validator.key".into(), origin_address: "127.0.0.1".into() }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl DispatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds.max(1))
    }

    pub fn callback_ttl(&self) -> Duration {
        Duration::from_secs(self.callback_ttl_seconds.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

/// A config document stored under the uplink config directory
pub trait ConfigFile: Default + Serialize + DeserializeOwned {
    /// File name used when no explicit path is given
    const FILE_NAME: &'static str;

    /// Load the config, writing defaults first if the file does not exist
    ///
    /// ```no_run
    /// use uplink::config::{ConfigFile, HubConfig};
    ///
    /// let cfg = HubConfig::from_config(None::<&std::path::Path>)?;
    /// println!("{cfg}");
    /// # Ok::<(), uplink::config::ConfigError>(())
    /// ```
    fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path = match optional_path {
            Some(path) => normalize_toml_path(path.as_ref()),
            None => default_config_dir()?.join(Self::FILE_NAME),
        };

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::ReadFailed { path: config_path.clone(), source }
            })?;
            toml::from_str(&raw)
                .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            Ok(config)
        }
    }

    /// Serialize and write the config to `path`
    fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }
}

impl ConfigFile for HubConfig {
    const FILE_NAME: &'static str = "hub.toml";
}

impl ConfigFile for ValidatorConfig {
    const FILE_NAME: &'static str = "validator.toml";
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// $XDG_CONFIG_HOME/uplink or $HOME/.config/uplink
fn default_config_dir() -> Result<path::PathBuf, ConfigError> {
    let base = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home) = env::var("HOME") {
        path::PathBuf::from(home).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(base.join("uplink"))
}

impl fmt::Display for HubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hub configuration:")?;
        writeln!(f, "  Listen address: {}", self.server.listen_addr())?;
        writeln!(f, "  Dispatch period: {}s", self.dispatch.period_seconds)?;
        writeln!(f, "  Reward per check: {}", self.dispatch.reward_per_check)?;
        writeln!(f, "  Callback TTL: {}s", self.dispatch.callback_ttl_seconds)?;
        writeln!(f, "  Sweep interval: {}s", self.dispatch.sweep_interval_seconds)?;
        write!(f, "  Database: {}", self.database.path)
    }
}

impl fmt::Display for ValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validator configuration:")?;
        writeln!(f, "  Hub: {}", self.hub.url)?;
        writeln!(f, "  Keypair: {}", self.identity.keypair_path)?;
        writeln!(f, "  Origin address: {}", self.identity.origin_address)?;
        write!(f, "  Probe timeout: {}s", self.probe.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");

        let config = HubConfig::from_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.dispatch.period_seconds, 60);
        assert_eq!(config.dispatch.reward_per_check, DEFAULT_REWARD_PER_CHECK);
        assert_eq!(config.server.port, DEFAULT_HUB_PORT);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "[dispatch]\nperiod_seconds = 5\n").unwrap();

        let config = HubConfig::from_config(Some(&path)).unwrap();
        assert_eq!(config.dispatch.period_seconds, 5);
        assert_eq!(config.dispatch.callback_ttl_seconds, 120);
        assert_eq!(config.database.path, "uplink.db");
    }

    #[test]
    fn test_extension_is_normalized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("validator");

        ValidatorConfig::from_config(Some(&path)).unwrap();
        assert!(dir.path().join("validator.toml").exists());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[dispatch\nperiod_seconds = ").unwrap();

        assert!(matches!(
            HubConfig::from_config(Some(&path)),
            Err(ConfigError::ParseFailed { .. })
        ));
    }
}
