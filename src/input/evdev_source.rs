//! evdev-based key listener
//!
//! Uses the Linux evdev interface to observe key events at the kernel level.
//! This works on all Wayland compositors because it bypasses the display server.
//! Devices are read without grabbing them, so several listeners (and the
//! focused application) all see the same events.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{InputSource, KeyListener, KeyState, KeyTransition, LISTENER_CHANNEL_CAPACITY};
use crate::error::InputError;
use crate::key::KeyId;
use crate::output::uinput::VIRTUAL_DEVICE_NAME;
use evdev::{Device, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// evdev-based input source
#[derive(Default)]
pub struct EvdevSource;

impl EvdevSource {
    pub fn new() -> Self {
        Self
    }
}

impl InputSource for EvdevSource {
    fn listen(&self) -> Result<KeyListener, InputError> {
        let device_paths = find_keyboard_devices()?;
        if device_paths.is_empty() {
            return Err(InputError::NoKeyboard);
        }

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        let devices = open_devices(&device_paths)?;

        let (tx, rx) = mpsc::channel(LISTENER_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            evdev_listener_loop(devices, tx, stop_rx);
        });

        Ok(KeyListener::new(rx, stop_tx))
    }

    fn name(&self) -> &'static str {
        "evdev"
    }
}

/// Open all keyboard devices in non-blocking mode
fn open_devices(device_paths: &[PathBuf]) -> Result<Vec<Device>, InputError> {
    let mut last_error = None;
    let devices: Vec<Device> = device_paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                // Set device to non-blocking mode so fetch_events doesn't block
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                tracing::debug!("Opened device (non-blocking): {:?}", path);
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                last_error = Some(InputError::from(e));
                None
            }
        })
        .collect();

    if devices.is_empty() {
        return Err(last_error.unwrap_or(InputError::NoKeyboard));
    }
    Ok(devices)
}

/// Main listener loop running in a blocking task
fn evdev_listener_loop(
    mut devices: Vec<Device>,
    tx: mpsc::Sender<KeyTransition>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    tracing::debug!("Key listener started on {} device(s)", devices.len());

    loop {
        // Check for stop signal (non-blocking)
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Key listener stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        // Poll each device (all set to non-blocking mode). A device that
        // reports anything but "no events yet" is gone and gets dropped.
        let mut closed = false;
        devices.retain_mut(|device| {
            if closed {
                return true;
            }
            let error = match device.fetch_events() {
                Ok(events) => {
                    for event in events {
                        if let InputEventKind::Key(key) = event.kind() {
                            let state = match event.value() {
                                1 => KeyState::Down,
                                0 => KeyState::Up,
                                2 => KeyState::Repeat,
                                _ => continue,
                            };
                            let transition = KeyTransition {
                                key: key_id_from_evdev(key),
                                state,
                            };
                            tracing::trace!("{:?}", transition);
                            if tx.blocking_send(transition).is_err() {
                                closed = true; // Listener handle dropped
                                break;
                            }
                        }
                    }
                    return true;
                }
                Err(e) => e,
            };
            if !device_gone(&error) {
                return true;
            }
            tracing::warn!(
                "Dropping input device {:?}: {}",
                device.name().unwrap_or("unknown"),
                error
            );
            false
        });

        if closed {
            return;
        }
        if devices.is_empty() {
            tracing::warn!("All keyboard devices are gone, key listener stopped");
            return;
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

/// Whether a read error means the device was unplugged or broke
///
/// Non-blocking devices report "no events yet" as `WouldBlock`.
fn device_gone(err: &std::io::Error) -> bool {
    err.kind() != std::io::ErrorKind::WouldBlock
}

/// Find all keyboard input devices, skipping our own replay device
fn find_keyboard_devices() -> Result<Vec<PathBuf>, InputError> {
    let mut keyboards = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| InputError::Device(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| InputError::Device(e.to_string()))?;
        let path = entry.path();

        // Only look at event* devices
        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        // Try to open and check if it's a keyboard
        match Device::open(&path) {
            Ok(device) => {
                if device.name() == Some(VIRTUAL_DEVICE_NAME) {
                    tracing::trace!("Skipping replay device {:?}", path);
                    continue;
                }

                // A keyboard should have at least some letter keys
                let has_keys = device
                    .supported_keys()
                    .map(|keys| {
                        keys.contains(Key::KEY_A)
                            && keys.contains(Key::KEY_Z)
                            && keys.contains(Key::KEY_ENTER)
                    })
                    .unwrap_or(false);

                if has_keys {
                    tracing::debug!(
                        "Found keyboard: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    keyboards.push(path);
                }
            }
            Err(e) => {
                // Permission denied is common for non-input-group users
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(InputError::PermissionDenied(path.display().to_string()));
                }
                // Other errors (device busy, etc.) - just skip
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}

const LETTER_KEYS: [Key; 26] = [
    Key::KEY_A,
    Key::KEY_B,
    Key::KEY_C,
    Key::KEY_D,
    Key::KEY_E,
    Key::KEY_F,
    Key::KEY_G,
    Key::KEY_H,
    Key::KEY_I,
    Key::KEY_J,
    Key::KEY_K,
    Key::KEY_L,
    Key::KEY_M,
    Key::KEY_N,
    Key::KEY_O,
    Key::KEY_P,
    Key::KEY_Q,
    Key::KEY_R,
    Key::KEY_S,
    Key::KEY_T,
    Key::KEY_U,
    Key::KEY_V,
    Key::KEY_W,
    Key::KEY_X,
    Key::KEY_Y,
    Key::KEY_Z,
];

const DIGIT_KEYS: [Key; 10] = [
    Key::KEY_0,
    Key::KEY_1,
    Key::KEY_2,
    Key::KEY_3,
    Key::KEY_4,
    Key::KEY_5,
    Key::KEY_6,
    Key::KEY_7,
    Key::KEY_8,
    Key::KEY_9,
];

const FUNCTION_KEYS: [Key; 24] = [
    Key::KEY_F1,
    Key::KEY_F2,
    Key::KEY_F3,
    Key::KEY_F4,
    Key::KEY_F5,
    Key::KEY_F6,
    Key::KEY_F7,
    Key::KEY_F8,
    Key::KEY_F9,
    Key::KEY_F10,
    Key::KEY_F11,
    Key::KEY_F12,
    Key::KEY_F13,
    Key::KEY_F14,
    Key::KEY_F15,
    Key::KEY_F16,
    Key::KEY_F17,
    Key::KEY_F18,
    Key::KEY_F19,
    Key::KEY_F20,
    Key::KEY_F21,
    Key::KEY_F22,
    Key::KEY_F23,
    Key::KEY_F24,
];

/// Punctuation keys on a US layout, by unshifted character
const PUNCTUATION_KEYS: [(char, Key); 12] = [
    ('-', Key::KEY_MINUS),
    ('=', Key::KEY_EQUAL),
    ('[', Key::KEY_LEFTBRACE),
    (']', Key::KEY_RIGHTBRACE),
    (';', Key::KEY_SEMICOLON),
    ('\'', Key::KEY_APOSTROPHE),
    ('`', Key::KEY_GRAVE),
    ('\\', Key::KEY_BACKSLASH),
    (',', Key::KEY_COMMA),
    ('.', Key::KEY_DOT),
    ('/', Key::KEY_SLASH),
    ('+', Key::KEY_KPPLUS),
];

/// Map an evdev key to a key identifier
///
/// Keys without a named identifier keep their evdev name, lowercased and
/// without the KEY_ prefix (e.g. "volumeup"), through [`KeyId::unnamed`].
pub fn key_id_from_evdev(key: Key) -> KeyId {
    if let Some(i) = LETTER_KEYS.iter().position(|k| *k == key) {
        return KeyId::Char((b'a' + i as u8) as char);
    }
    if let Some(i) = DIGIT_KEYS.iter().position(|k| *k == key) {
        return KeyId::Char((b'0' + i as u8) as char);
    }
    if let Some(i) = FUNCTION_KEYS.iter().position(|k| *k == key) {
        return KeyId::F(i as u8 + 1);
    }
    if let Some((c, _)) = PUNCTUATION_KEYS.iter().find(|(_, k)| *k == key) {
        return KeyId::Char(*c);
    }

    match key {
        Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => KeyId::Ctrl,
        Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => KeyId::Shift,
        Key::KEY_LEFTALT | Key::KEY_RIGHTALT => KeyId::Alt,
        Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => KeyId::Meta,
        Key::KEY_ENTER | Key::KEY_KPENTER => KeyId::Enter,
        Key::KEY_SPACE => KeyId::Space,
        Key::KEY_TAB => KeyId::Tab,
        Key::KEY_BACKSPACE => KeyId::Backspace,
        Key::KEY_ESC => KeyId::Esc,
        Key::KEY_DELETE => KeyId::Delete,
        Key::KEY_INSERT => KeyId::Insert,
        Key::KEY_HOME => KeyId::Home,
        Key::KEY_END => KeyId::End,
        Key::KEY_PAGEUP => KeyId::PageUp,
        Key::KEY_PAGEDOWN => KeyId::PageDown,
        Key::KEY_UP => KeyId::Up,
        Key::KEY_DOWN => KeyId::Down,
        Key::KEY_LEFT => KeyId::Left,
        Key::KEY_RIGHT => KeyId::Right,
        Key::KEY_CAPSLOCK => KeyId::CapsLock,
        Key::KEY_NUMLOCK => KeyId::NumLock,
        Key::KEY_SCROLLLOCK => KeyId::ScrollLock,
        Key::KEY_SYSRQ | Key::KEY_PRINT => KeyId::PrintScreen,
        Key::KEY_PAUSE => KeyId::Pause,
        Key::KEY_COMPOSE | Key::KEY_MENU => KeyId::Menu,
        other => {
            let name = format!("{:?}", other).to_lowercase();
            KeyId::unnamed(name.strip_prefix("key_").unwrap_or(&name))
        }
    }
}

/// Map a key identifier to the evdev key that produces it
pub fn key_id_to_evdev(key: &KeyId) -> Option<Key> {
    let mapped = match key {
        KeyId::Ctrl => Key::KEY_LEFTCTRL,
        KeyId::Shift => Key::KEY_LEFTSHIFT,
        KeyId::Alt => Key::KEY_LEFTALT,
        KeyId::Meta => Key::KEY_LEFTMETA,
        KeyId::Enter => Key::KEY_ENTER,
        KeyId::Space => Key::KEY_SPACE,
        KeyId::Tab => Key::KEY_TAB,
        KeyId::Backspace => Key::KEY_BACKSPACE,
        KeyId::Esc => Key::KEY_ESC,
        KeyId::Delete => Key::KEY_DELETE,
        KeyId::Insert => Key::KEY_INSERT,
        KeyId::Home => Key::KEY_HOME,
        KeyId::End => Key::KEY_END,
        KeyId::PageUp => Key::KEY_PAGEUP,
        KeyId::PageDown => Key::KEY_PAGEDOWN,
        KeyId::Up => Key::KEY_UP,
        KeyId::Down => Key::KEY_DOWN,
        KeyId::Left => Key::KEY_LEFT,
        KeyId::Right => Key::KEY_RIGHT,
        KeyId::CapsLock => Key::KEY_CAPSLOCK,
        KeyId::NumLock => Key::KEY_NUMLOCK,
        KeyId::ScrollLock => Key::KEY_SCROLLLOCK,
        KeyId::PrintScreen => Key::KEY_SYSRQ,
        KeyId::Pause => Key::KEY_PAUSE,
        KeyId::Menu => Key::KEY_COMPOSE,
        KeyId::F(n) => *FUNCTION_KEYS.get((*n as usize).checked_sub(1)?)?,
        KeyId::Char(c) => return char_key(*c),
        KeyId::Other(_) => return key.device_name().and_then(other_key),
    };
    Some(mapped)
}

fn char_key(c: char) -> Option<Key> {
    let c = c.to_ascii_lowercase();
    if c.is_ascii_lowercase() {
        return LETTER_KEYS.get((c as u8 - b'a') as usize).copied();
    }
    if c.is_ascii_digit() {
        return DIGIT_KEYS.get((c as u8 - b'0') as usize).copied();
    }
    PUNCTUATION_KEYS
        .iter()
        .find(|(p, _)| *p == c)
        .map(|(_, k)| *k)
}

/// Keys that only exist as pass-through names
fn other_key(name: &str) -> Option<Key> {
    let normalized: String = name
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect();
    let normalized = normalized.strip_prefix("key").unwrap_or(&normalized);

    let key = match normalized {
        "mute" | "volumemute" => Key::KEY_MUTE,
        "volumedown" => Key::KEY_VOLUMEDOWN,
        "volumeup" => Key::KEY_VOLUMEUP,
        "playpause" | "playpausemedia" => Key::KEY_PLAYPAUSE,
        "nextsong" | "nexttrack" => Key::KEY_NEXTSONG,
        "previoussong" | "previoustrack" | "prevtrack" => Key::KEY_PREVIOUSSONG,
        "stopcd" | "stopmedia" => Key::KEY_STOPCD,
        "kpplus" => Key::KEY_KPPLUS,
        "kpminus" => Key::KEY_KPMINUS,
        "kpenter" => Key::KEY_KPENTER,
        "leftctrl" => Key::KEY_LEFTCTRL,
        "rightctrl" => Key::KEY_RIGHTCTRL,
        "brightnessup" => Key::KEY_BRIGHTNESSUP,
        "brightnessdown" => Key::KEY_BRIGHTNESSDOWN,
        "next" => Key::KEY_NEXT,
        "previous" => Key::KEY_PREVIOUS,
        "option" => Key::KEY_OPTION,
        "break" => Key::KEY_BREAK,
        _ => return None,
    };
    Some(key)
}
