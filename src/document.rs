//! Opaque application data document
//!
//! One arbitrary JSON value kept in its own file next to the pattern store.
//! Its contents are never interpreted; a save replaces it wholesale.

use crate::error::StorageError;
use crate::pattern::storage::{read_json, write_json_atomic};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// File-backed JSON document
pub struct DocumentStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document; an empty array when missing or unreadable
    pub fn load(&self) -> Value {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match read_json(&self.path) {
            Ok(Some(value)) => value,
            Ok(None) => Value::Array(Vec::new()),
            Err(e) => {
                tracing::warn!("Could not load application data: {}", e);
                Value::Array(Vec::new())
            }
        }
    }

    /// Replace the document
    pub fn save(&self, value: &Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        write_json_atomic(&self.path, value).inspect_err(|e| {
            tracing::error!("Could not save application data: {}", e);
        })
    }
}
