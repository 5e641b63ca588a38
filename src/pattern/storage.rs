//! Durable backends for the pattern sequence
//!
//! The store only ever loads or saves the whole sequence, so a backend is
//! a pair of functions. The JSON file backend writes through a temporary
//! file in the same directory and renames it over the target; readers see
//! either the previous file or the new one, never a partial write.

use super::Pattern;
use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Load/save access to a persisted pattern sequence
pub trait PatternStorage: Send + Sync {
    /// Read the full sequence. A store that was never written is empty.
    fn load(&self) -> Result<Vec<Pattern>, StorageError>;

    /// Replace the full sequence
    fn save(&self, patterns: &[Pattern]) -> Result<(), StorageError>;

    /// Human-readable location for logging
    fn describe(&self) -> String;
}

impl<T: PatternStorage + ?Sized> PatternStorage for Arc<T> {
    fn load(&self) -> Result<Vec<Pattern>, StorageError> {
        (**self).load()
    }

    fn save(&self, patterns: &[Pattern]) -> Result<(), StorageError> {
        (**self).save(patterns)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Patterns stored as a pretty-printed JSON array in one file
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatternStorage for JsonFileStorage {
    fn load(&self) -> Result<Vec<Pattern>, StorageError> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    fn save(&self, patterns: &[Pattern]) -> Result<(), StorageError> {
        write_json_atomic(&self.path, patterns)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory backend, used by tests and when persistence is not wanted
#[derive(Default)]
pub struct MemoryStorage {
    patterns: Mutex<Vec<Pattern>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail, to exercise error reporting
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PatternStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<Pattern>, StorageError> {
        Ok(self
            .patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, patterns: &[Pattern]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "writes disabled"),
            });
        }
        *self.patterns.lock().unwrap_or_else(PoisonError::into_inner) = patterns.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}

/// Read and decode a JSON file; `None` when the file does not exist
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StorageError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Encode `value` and atomically replace `path` with it
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StorageError> {
    let write_err = |source: std::io::Error| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let bytes = serde_json::to_vec_pretty(value)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    tracing::trace!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}
