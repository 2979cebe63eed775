//! TOML-based configuration persistence.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\tesmart-remote\config.toml`
//! - Linux:    `~/.config/tesmart-remote/config.toml`
//! - macOS:    `~/Library/Application Support/tesmart-remote/config.toml`
//!
//! Every field carries a `#[serde(default = "...")]` helper so a partial or
//! absent file still yields a working configuration, and [`load_config`]
//! normalises out-of-range numeric values back to their defaults rather
//! than failing.  The first `load_config` call on a fresh machine writes
//! the default file so users have something to edit.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Display metadata for one of the sixteen input ports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortEntry {
    /// Port number, 1..=16.
    pub number: u8,
    /// Display name shown by the UI collaborator.
    pub name: String,
    /// Optional icon path; empty when unset.
    #[serde(default)]
    pub icon: String,
}

/// Application configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Switch IPv4 address.
    #[serde(default = "default_ip")]
    pub ip: String,
    /// Switch TCP port.  Carries both wire protocols.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Poll coordinator tick period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Skip post-switch verification entirely; the poller reconciles.
    #[serde(default)]
    pub fast_mode: bool,
    /// Total deadline for query operations in milliseconds.
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,
    /// Total deadline for set operations in milliseconds.
    #[serde(default = "default_set_timeout_ms")]
    pub set_timeout_ms: u64,
    /// Poll twice at 90 ms spacing after a switch to confirm it landed.
    #[serde(default = "default_true")]
    pub verify_after_set: bool,
    /// Pending-switch suppression window in milliseconds.
    #[serde(default = "default_switch_suppress_ms")]
    pub switch_suppress_ms: u64,
    /// Display metadata per port; missing ports are filled with "Port N".
    #[serde(default)]
    pub ports: Vec<PortEntry>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_ip() -> String {
    "192.168.1.10".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_get_timeout_ms() -> u64 {
    600
}
fn default_set_timeout_ms() -> u64 {
    450
}
fn default_switch_suppress_ms() -> u64 {
    800
}
fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut cfg = Self {
            ip: default_ip(),
            port: default_port(),
            poll_interval_ms: default_poll_interval_ms(),
            fast_mode: false,
            get_timeout_ms: default_get_timeout_ms(),
            set_timeout_ms: default_set_timeout_ms(),
            verify_after_set: default_true(),
            switch_suppress_ms: default_switch_suppress_ms(),
            ports: Vec::new(),
        };
        cfg.fill_missing_ports();
        cfg
    }
}

impl AppConfig {
    /// `host:port` string for the configured target.
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    pub fn set_timeout(&self) -> Duration {
        Duration::from_millis(self.set_timeout_ms)
    }

    pub fn switch_suppress(&self) -> Duration {
        Duration::from_millis(self.switch_suppress_ms)
    }

    /// Display name for a port, falling back to `"Port N"`.
    pub fn port_name(&self, number: u8) -> String {
        self.ports
            .iter()
            .find(|p| p.number == number)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("Port {number}"))
    }

    /// Replaces zero/invalid numeric fields with their defaults and ensures
    /// every port 1..=16 has an entry.
    fn normalize(&mut self) {
        if self.ip.is_empty() {
            self.ip = default_ip();
        }
        if self.port == 0 {
            self.port = default_port();
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = default_poll_interval_ms();
        }
        if self.get_timeout_ms == 0 {
            self.get_timeout_ms = default_get_timeout_ms();
        }
        if self.set_timeout_ms == 0 {
            self.set_timeout_ms = default_set_timeout_ms();
        }
        if self.switch_suppress_ms == 0 {
            self.switch_suppress_ms = default_switch_suppress_ms();
        }
        self.fill_missing_ports();
    }

    fn fill_missing_ports(&mut self) {
        for n in 1..=16u8 {
            if !self.ports.iter().any(|p| p.number == n) {
                self.ports.push(PortEntry {
                    number: n,
                    name: format!("Port {n}"),
                    icon: String::new(),
                });
            }
        }
        self.ports.sort_by_key(|p| p.number);
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config
/// base directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AppConfig`] from disk.
///
/// Creates the file with defaults on first run.  The returned flag is true
/// when the file was just created, so the caller can point the user at it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<(AppConfig, bool), ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let mut cfg: AppConfig = toml::from_str(&content)?;
            cfg.normalize();
            Ok((cfg, false))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let cfg = AppConfig::default();
            save_config(&cfg)?;
            Ok((cfg, true))
        }
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory plus the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("tesmart-remote"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tesmart-remote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("tesmart-remote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
