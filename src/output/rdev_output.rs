//! rdev-based key output for macOS and Windows
//!
//! Posts synthetic key events through the OS input queue. On macOS the
//! terminal/app needs Accessibility permission for the events to land.

use super::KeyEmitter;
use crate::error::EmitError;
use crate::input::rdev_source::key_id_to_rdev;
use crate::key::KeyId;
use rdev::EventType;

/// rdev key emitter
#[derive(Default)]
pub struct RdevEmitter;

impl RdevEmitter {
    pub fn new() -> Self {
        Self
    }

    fn simulate(&self, key: &KeyId, press: bool) -> Result<(), EmitError> {
        let code = key_id_to_rdev(key).ok_or_else(|| EmitError::UnmappedKey(key.to_string()))?;
        let event = if press {
            EventType::KeyPress(code)
        } else {
            EventType::KeyRelease(code)
        };
        rdev::simulate(&event).map_err(|_| EmitError::Failed {
            key: key.to_string(),
            reason: "the OS rejected the synthetic event".to_string(),
        })
    }
}

impl KeyEmitter for RdevEmitter {
    fn press(&self, key: &KeyId) -> Result<(), EmitError> {
        self.simulate(key, true)
    }

    fn release(&self, key: &KeyId) -> Result<(), EmitError> {
        self.simulate(key, false)
    }

    fn name(&self) -> &'static str {
        "rdev"
    }
}
