//! TOML-based configuration for the daemon.
//!
//! The daemon reads a single optional TOML file; every field has a default
//! so a missing file (first run) and an old file missing newer fields both
//! work.  Example:
//!
//! ```toml
//! port = 8787
//! bind_address = "0.0.0.0"
//! all_remote_connections = false
//! log_level = "info"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so partial
//! configs stay valid across upgrades.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
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
}

/// Daemon configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// TCP port the daemon listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind the listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// When `true`, every connection is treated as a remote device, even
    /// connections from loopback.  Useful when devices run on this machine.
    #[serde(default)]
    pub all_remote_connections: bool,
    /// Overrides automatic local-address resolution when set.  Connections
    /// from exactly this address (or from loopback) take the script path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_address: Option<IpAddr>,
    /// `tracing` log level used when `RUST_LOG` is not set: `"error"`,
    /// `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            all_remote_connections: false,
            local_address: None,
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Loads the configuration from `path`, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read or
    /// parsed; a present-but-broken config is a real error, not a default.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

fn default_port() -> u16 {
    8787
}

fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().expect("valid literal")
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
