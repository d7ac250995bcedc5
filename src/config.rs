//! Configuration for vtgrab.
//!
//! Settings are read from `~/.vtgrab/config.toml` unless another file is
//! given with `--config`:
//!
//! ```toml
//! # Seconds to hold the terminal before handing it back
//! hold_secs = 2
//!
//! # Signal the kernel sends on VT switch requests
//! signal = "SIGUSR1"
//!
//! # Use raw keyboard mode if "off" is refused
//! keyboard_fallback = true
//!
//! # Log level and optional log file (stderr otherwise)
//! log_level = "info"
//! log_file = "/var/log/vtgrab.log"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long to hold the VT, in seconds
    pub hold_secs: u64,
    /// VT switch signal name
    pub signal: String,
    /// Allow falling back to raw keyboard mode
    pub keyboard_fallback: bool,
    /// Default log level when RUST_LOG is unset
    pub log_level: String,
    /// Append logs here instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hold_secs: 2,
            signal: "SIGUSR1".to_string(),
            keyboard_fallback: true,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when the
    /// file is missing or unreadable
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                if let Ok(config) = Self::load_from(&path) {
                    return config;
                }
            }
        }
        Self::default()
    }

    /// Load from an explicit path; errors are reported
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".vtgrab").join("config.toml"))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
