//! Synthetic key output
//!
//! Replay drives a [`KeyEmitter`], which presses and releases one key at a
//! time. On Linux the emitter is a uinput virtual keyboard, which works on
//! X11, every Wayland compositor and the TTY. Other platforms use rdev.
//!
//! When no emitter can be created, [`UnavailableEmitter`] stands in so the
//! rest of the daemon keeps running and replay reports why it cannot work.

#[cfg(not(target_os = "linux"))]
pub mod rdev_output;
#[cfg(target_os = "linux")]
pub mod uinput;

use crate::error::EmitError;
use crate::key::KeyId;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Trait for key emission implementations
pub trait KeyEmitter: Send + Sync {
    /// Check that the emission subsystem can be used at all
    fn ready(&self) -> Result<(), EmitError> {
        Ok(())
    }

    /// Send a key-down event
    fn press(&self, key: &KeyId) -> Result<(), EmitError>;

    /// Send a key-up event
    fn release(&self, key: &KeyId) -> Result<(), EmitError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Create the key emitter for this platform
#[cfg(target_os = "linux")]
pub fn create_emitter() -> Result<Box<dyn KeyEmitter>, EmitError> {
    Ok(Box::new(uinput::UinputEmitter::new()?))
}

/// Create the key emitter for this platform
#[cfg(not(target_os = "linux"))]
pub fn create_emitter() -> Result<Box<dyn KeyEmitter>, EmitError> {
    Ok(Box::new(rdev_output::RdevEmitter::new()))
}

/// Emitter used when the platform emitter could not be created
pub struct UnavailableEmitter {
    reason: String,
}

impl UnavailableEmitter {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl KeyEmitter for UnavailableEmitter {
    fn ready(&self) -> Result<(), EmitError> {
        Err(EmitError::Unavailable(self.reason.clone()))
    }

    fn press(&self, _key: &KeyId) -> Result<(), EmitError> {
        self.ready()
    }

    fn release(&self, _key: &KeyId) -> Result<(), EmitError> {
        self.ready()
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Direction of an emitted key action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// One emitted key action and when it happened
#[derive(Debug, Clone)]
pub struct EmittedKey {
    pub key: KeyId,
    pub action: KeyAction,
    pub at: Instant,
}

/// Emitter that records what it was asked to send
///
/// Keys registered with [`RecordingEmitter::fail_on`] are rejected, to
/// exercise per-key fault handling.
#[derive(Default)]
pub struct RecordingEmitter {
    emitted: Mutex<Vec<EmittedKey>>,
    failing: Mutex<HashSet<KeyId>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject presses of `key` from now on
    pub fn fail_on(&self, key: KeyId) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
    }

    /// Everything emitted so far
    pub fn emitted(&self) -> Vec<EmittedKey> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keys pressed so far, in order
    pub fn pressed(&self) -> Vec<KeyId> {
        self.emitted()
            .into_iter()
            .filter(|e| e.action == KeyAction::Press)
            .map(|e| e.key)
            .collect()
    }

    fn record(&self, key: &KeyId, action: KeyAction) {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EmittedKey {
                key: key.clone(),
                action,
                at: Instant::now(),
            });
    }
}

impl KeyEmitter for RecordingEmitter {
    fn press(&self, key: &KeyId) -> Result<(), EmitError> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key);
        if failing {
            return Err(EmitError::UnmappedKey(key.to_string()));
        }
        self.record(key, KeyAction::Press);
        Ok(())
    }

    fn release(&self, key: &KeyId) -> Result<(), EmitError> {
        self.record(key, KeyAction::Release);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

impl<T: KeyEmitter + ?Sized> KeyEmitter for std::sync::Arc<T> {
    fn ready(&self) -> Result<(), EmitError> {
        (**self).ready()
    }

    fn press(&self, key: &KeyId) -> Result<(), EmitError> {
        (**self).press(key)
    }

    fn release(&self, key: &KeyId) -> Result<(), EmitError> {
        (**self).release(key)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
