//! Error types for uniforge
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the uniforge application
#[derive(Error, Debug)]
pub enum UniforgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Pattern not found: '{0}'")]
    NotFound(String),

    #[error("A capture session is already running")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Key emission error: {0}")]
    Emit(#[from] EmitError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Daemon request failed: {0}")]
    Daemon(String),
}

/// Errors parsing key names and hotkey combinations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Key name is empty")]
    Empty,

    #[error("Invalid key name '{0}': '+' joins keys in a combination, use 'plus' for the key itself")]
    Separator(String),

    #[error("Invalid key name '{0}': unknown key names cannot contain whitespace")]
    Whitespace(String),

    #[error("Invalid hotkey '{combo}': {reason}")]
    Combination { combo: String, reason: String },
}

/// Errors reading or writing persisted state
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed data in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to encode data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors installing a key listener
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    PermissionDenied(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("Input device error: {0}")]
    Device(String),
}

/// Errors emitting synthetic key events
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("Key '{0}' has no mapping on this platform")]
    UnmappedKey(String),

    #[error("Failed to emit key '{key}': {reason}")]
    Failed { key: String, reason: String },

    #[error("Key emission is unavailable: {0}\n  Ensure /dev/uinput is writable (user in the 'input' group, uinput module loaded).")]
    Unavailable(String),
}

impl InputError {
    /// Human-readable remediation text for a capture that recorded nothing
    pub fn remediation(&self) -> String {
        match self {
            InputError::PermissionDenied(_) => format!(
                "{} Capture recorded nothing; grant input permission (or run with elevated privileges) and retry.",
                self
            ),
            _ => format!("{} Capture recorded nothing.", self),
        }
    }
}

/// Result type alias using UniforgeError
pub type Result<T> = std::result::Result<T, UniforgeError>;

#[cfg(target_os = "linux")]
impl From<std::io::Error> for InputError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            InputError::PermissionDenied(e.to_string())
        } else {
            InputError::Device(e.to_string())
        }
    }
}
