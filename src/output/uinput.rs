//! uinput-based key output
//!
//! Creates a virtual keyboard through /dev/uinput and writes key events to
//! it. The kernel delivers them like any other keyboard, so this works on
//! X11, every Wayland compositor and the TTY without a helper daemon.
//!
//! Requires:
//! - uinput kernel module loaded
//! - Write access to /dev/uinput (user in 'input' group, or a udev rule)

use super::KeyEmitter;
use crate::error::EmitError;
use crate::input::evdev_source::key_id_to_evdev;
use crate::key::KeyId;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use std::sync::{Mutex, PoisonError};

/// Name of the virtual keyboard; key listeners skip it so replayed keys
/// are never captured or matched against hotkeys
pub const VIRTUAL_DEVICE_NAME: &str = "uniforge virtual keyboard";

/// Key codes the virtual keyboard is allowed to send
const MAX_KEY_CODE: u16 = 0x2ff;

/// uinput virtual keyboard
pub struct UinputEmitter {
    device: Mutex<VirtualDevice>,
}

impl UinputEmitter {
    /// Create the virtual keyboard
    pub fn new() -> Result<Self, EmitError> {
        let unavailable = |e: std::io::Error| EmitError::Unavailable(format!("/dev/uinput: {}", e));

        let mut keys = AttributeSet::<Key>::new();
        for code in 1..MAX_KEY_CODE {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(unavailable)?
            .name(VIRTUAL_DEVICE_NAME)
            .with_keys(&keys)
            .map_err(unavailable)?
            .build()
            .map_err(unavailable)?;

        tracing::debug!("Created virtual keyboard '{}'", VIRTUAL_DEVICE_NAME);

        Ok(Self {
            device: Mutex::new(device),
        })
    }

    fn emit(&self, key: &KeyId, value: i32) -> Result<(), EmitError> {
        let code = key_id_to_evdev(key).ok_or_else(|| EmitError::UnmappedKey(key.to_string()))?;
        let event = InputEvent::new(EventType::KEY, code.code(), value);

        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(&[event])
            .map_err(|e| EmitError::Failed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

impl KeyEmitter for UinputEmitter {
    fn press(&self, key: &KeyId) -> Result<(), EmitError> {
        self.emit(key, 1)
    }

    fn release(&self, key: &KeyId) -> Result<(), EmitError> {
        self.emit(key, 0)
    }

    fn name(&self) -> &'static str {
        "uinput"
    }
}
