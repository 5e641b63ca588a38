//! Configuration loading and types for uniforge
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/uniforge/config.toml)
//! 3. Environment variables (UNIFORGE_*)
//! 4. CLI arguments (highest priority)

use crate::capture::{clamp_duration, DEFAULT_DURATION_SECS};
use crate::error::UniforgeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# UniForge Configuration
#
# Location: ~/.config/uniforge/config.toml
# All settings can be overridden via CLI flags

[service]
# Address the HTTP API listens on. Keep it on loopback: anyone who can
# reach the API can type on this machine.
host = "127.0.0.1"
port = 5001

# Largest accepted request body in bytes
max_body_bytes = 1048576

[capture]
# Capture window used when a request gives none (clamped to 1-30 seconds)
default_duration_secs = 3.0

[storage]
# Directory holding patterns.json and data.json
# Relative paths are resolved against the daemon's working directory
data_dir = "."
patterns_file = "patterns.json"
document_file = "data.json"

[hotkeys]
# Listen for pattern hotkeys while the daemon runs
# Set to false to only replay patterns through the API or CLI
enabled = true
"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub hotkeys: HotkeysConfig,
}

/// HTTP service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body limit in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Capture defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: f64,
}

/// Where persisted state lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_patterns_file")]
    pub patterns_file: String,

    #[serde(default = "default_document_file")]
    pub document_file: String,
}

/// Global hotkey listening
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeysConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_duration_secs() -> f64 {
    DEFAULT_DURATION_SECS
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_patterns_file() -> String {
    "patterns.json".to_string()
}

fn default_document_file() -> String {
    "data.json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: default_duration_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            patterns_file: default_patterns_file(),
            document_file: default_document_file(),
        }
    }
}

impl Default for HotkeysConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "uniforge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (pid lock)
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir())
            .join("uniforge")
    }

    /// Path of the pattern store file
    pub fn patterns_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.patterns_file)
    }

    /// Path of the application data document
    pub fn document_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.document_file)
    }

    /// Base URL of the daemon's HTTP API
    pub fn service_url(&self) -> String {
        let host = match self.service.host.as_str() {
            "0.0.0.0" | "::" => "127.0.0.1",
            host => host,
        };
        format!("http://{}:{}", host, self.service.port)
    }

    /// Capture window for requests that give none
    pub fn default_capture_secs(&self) -> f64 {
        clamp_duration(self.capture.default_duration_secs)
    }

    /// Apply UNIFORGE_* overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), UniforgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("UNIFORGE_HOST") {
            self.service.host = host;
        }
        if let Some(port) = lookup("UNIFORGE_PORT") {
            self.service.port = port
                .trim()
                .parse()
                .map_err(|_| UniforgeError::Config(format!("Invalid UNIFORGE_PORT: {}", port)))?;
        }
        if let Some(dir) = lookup("UNIFORGE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, UniforgeError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| UniforgeError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| UniforgeError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    config.apply_env(|name| std::env::var(name).ok())?;

    Ok(config)
}
