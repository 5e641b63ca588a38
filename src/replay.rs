//! Deterministic key replay
//!
//! Each key is pressed and released, then the engine waits [`KEY_DELAY`]
//! before the next one. A key that cannot be emitted is logged and reported
//! but does not stop the rest of the sequence, and the delay is kept so the
//! timing of the remaining keys does not shift.

use crate::error::{Result, UniforgeError};
use crate::key::KeyId;
use crate::output::KeyEmitter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Pause after every key
pub const KEY_DELAY: Duration = Duration::from_millis(20);

/// A key that could not be emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFailure {
    /// Position in the replayed sequence
    pub index: usize,
    pub key: KeyId,
    pub reason: String,
}

/// What a replay did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Keys attempted
    pub emitted: usize,
    pub failed: Vec<KeyFailure>,
}

impl ReplayReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Plays key sequences through a [`KeyEmitter`]
#[derive(Clone)]
pub struct ReplayEngine {
    emitter: Arc<dyn KeyEmitter>,
}

impl ReplayEngine {
    pub fn new(emitter: Arc<dyn KeyEmitter>) -> Self {
        Self { emitter }
    }

    pub fn emitter_name(&self) -> &'static str {
        self.emitter.name()
    }

    /// Replay `events` in order, blocking until done
    pub fn replay(&self, events: &[KeyId]) -> Result<ReplayReport> {
        if events.is_empty() {
            return Err(UniforgeError::InvalidArgument(
                "pattern has no keys to replay".to_string(),
            ));
        }
        self.emitter.ready()?;

        tracing::debug!(
            "Replaying {} key(s) via {}",
            events.len(),
            self.emitter.name()
        );

        let mut report = ReplayReport::default();
        for (index, key) in events.iter().enumerate() {
            if let Err(e) = self.tap(key) {
                tracing::warn!("Failed to replay key '{}' at {}: {}", key, index, e);
                report.failed.push(KeyFailure {
                    index,
                    key: key.clone(),
                    reason: e.to_string(),
                });
            }
            report.emitted += 1;
            std::thread::sleep(KEY_DELAY);
        }

        Ok(report)
    }

    /// Replay on the blocking pool
    pub async fn replay_async(&self, events: Vec<KeyId>) -> Result<ReplayReport> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.replay(&events))
            .await
            .map_err(|e| UniforgeError::Task(e.to_string()))?
    }

    fn tap(&self, key: &KeyId) -> std::result::Result<(), crate::error::EmitError> {
        self.emitter.press(key)?;
        self.emitter.release(key)
    }
}
