//! Configuration file support for uartota.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (UARTOTA_*)
//! 3. Local config file (./uartota.toml)
//! 4. Global config file (~/.config/uartota/config.toml)
//!
//! `--config <PATH>` replaces both files.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local configuration file name.
pub const LOCAL_CONFIG: &str = "uartota.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Upload configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Payload bytes per write.
    pub chunk_size: Option<usize>,
    /// Delay after each chunk in milliseconds.
    pub pacing_ms: Option<u64>,
    /// Seconds to watch device output after the upload.
    pub monitor_secs: Option<u64>,
    /// Compare checksums after the upload.
    #[serde(default)]
    pub verify: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Upload configuration.
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "uartota").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        if other.upload.chunk_size.is_some() {
            self.upload.chunk_size = other.upload.chunk_size;
        }
        if other.upload.pacing_ms.is_some() {
            self.upload.pacing_ms = other.upload.pacing_ms;
        }
        if other.upload.monitor_secs.is_some() {
            self.upload.monitor_secs = other.upload.monitor_secs;
        }
        if other.upload.verify {
            self.upload.verify = true;
        }
    }
}
