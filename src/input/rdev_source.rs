//! rdev-based key listener for macOS and Windows
//!
//! rdev installs one process-wide OS hook and never returns from
//! `rdev::listen`, so a single hook thread is started on first use and fans
//! events out to every live listener.
//!
//! On macOS the terminal/app needs Accessibility permission.

use super::{InputSource, KeyListener, KeyState, KeyTransition, LISTENER_CHANNEL_CAPACITY};
use crate::error::InputError;
use crate::key::KeyId;
use rdev::{Event, EventType, Key};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long to wait for the hook to fail before assuming it is installed
const STARTUP_GRACE: Duration = Duration::from_millis(200);

#[derive(Default)]
struct Hub {
    subscribers: Mutex<Vec<mpsc::Sender<KeyTransition>>>,
    started: Mutex<bool>,
    failure: Mutex<Option<String>>,
}

static HUB: OnceLock<Hub> = OnceLock::new();

fn hub() -> &'static Hub {
    HUB.get_or_init(Hub::default)
}

impl Hub {
    fn dispatch(&self, transition: KeyTransition) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            // A full channel drops the event rather than stalling the OS hook
            let _ = tx.try_send(transition.clone());
        }
    }

    fn ensure_started(&'static self) -> Result<(), InputError> {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if *started {
            return match self
                .failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
            {
                Some(reason) => Err(InputError::PermissionDenied(reason)),
                None => Ok(()),
            };
        }

        let (err_tx, err_rx) = std::sync::mpsc::channel::<String>();
        std::thread::Builder::new()
            .name("uniforge-rdev-hook".to_string())
            .spawn(move || {
                let hub = hub();
                let result = rdev::listen(move |event: Event| {
                    if let Some(transition) = transition_from_event(&event) {
                        hub.dispatch(transition);
                    }
                });
                if let Err(e) = result {
                    let reason = format!("{:?}", e);
                    tracing::error!("rdev listen error: {}", reason);
                    *hub.failure.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(reason.clone());
                    hub.subscribers
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clear();
                    let _ = err_tx.send(reason);
                }
            })
            .map_err(|e| InputError::Device(e.to_string()))?;

        *started = true;
        match err_rx.recv_timeout(STARTUP_GRACE) {
            Ok(reason) => Err(InputError::PermissionDenied(reason)),
            Err(_) => Ok(()),
        }
    }
}

/// rdev-based input source
#[derive(Default)]
pub struct RdevSource;

impl RdevSource {
    pub fn new() -> Self {
        Self
    }
}

impl InputSource for RdevSource {
    fn listen(&self) -> Result<KeyListener, InputError> {
        let hub = hub();
        hub.ensure_started()?;

        let (tx, rx) = mpsc::channel(LISTENER_CHANNEL_CAPACITY);
        hub.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Ok(KeyListener::from_receiver(rx))
    }

    fn name(&self) -> &'static str {
        "rdev"
    }
}

fn transition_from_event(event: &Event) -> Option<KeyTransition> {
    match event.event_type {
        EventType::KeyPress(key) => Some(KeyTransition {
            key: key_id_from_rdev(key),
            state: KeyState::Down,
        }),
        EventType::KeyRelease(key) => Some(KeyTransition {
            key: key_id_from_rdev(key),
            state: KeyState::Up,
        }),
        _ => None,
    }
}

const LETTER_KEYS: [Key; 26] = [
    Key::KeyA,
    Key::KeyB,
    Key::KeyC,
    Key::KeyD,
    Key::KeyE,
    Key::KeyF,
    Key::KeyG,
    Key::KeyH,
    Key::KeyI,
    Key::KeyJ,
    Key::KeyK,
    Key::KeyL,
    Key::KeyM,
    Key::KeyN,
    Key::KeyO,
    Key::KeyP,
    Key::KeyQ,
    Key::KeyR,
    Key::KeyS,
    Key::KeyT,
    Key::KeyU,
    Key::KeyV,
    Key::KeyW,
    Key::KeyX,
    Key::KeyY,
    Key::KeyZ,
];

const DIGIT_KEYS: [Key; 10] = [
    Key::Num0,
    Key::Num1,
    Key::Num2,
    Key::Num3,
    Key::Num4,
    Key::Num5,
    Key::Num6,
    Key::Num7,
    Key::Num8,
    Key::Num9,
];

const FUNCTION_KEYS: [Key; 12] = [
    Key::F1,
    Key::F2,
    Key::F3,
    Key::F4,
    Key::F5,
    Key::F6,
    Key::F7,
    Key::F8,
    Key::F9,
    Key::F10,
    Key::F11,
    Key::F12,
];

const PUNCTUATION_KEYS: [(char, Key); 12] = [
    ('-', Key::Minus),
    ('=', Key::Equal),
    ('[', Key::LeftBracket),
    (']', Key::RightBracket),
    (';', Key::SemiColon),
    ('\'', Key::Quote),
    ('`', Key::BackQuote),
    ('\\', Key::BackSlash),
    (',', Key::Comma),
    ('.', Key::Dot),
    ('/', Key::Slash),
    ('+', Key::KpPlus),
];

/// Map an rdev key to a key identifier
pub fn key_id_from_rdev(key: Key) -> KeyId {
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
        Key::ControlLeft | Key::ControlRight => KeyId::Ctrl,
        Key::ShiftLeft | Key::ShiftRight => KeyId::Shift,
        Key::Alt | Key::AltGr => KeyId::Alt,
        Key::MetaLeft | Key::MetaRight => KeyId::Meta,
        Key::Return | Key::KpReturn => KeyId::Enter,
        Key::Space => KeyId::Space,
        Key::Tab => KeyId::Tab,
        Key::Backspace => KeyId::Backspace,
        Key::Escape => KeyId::Esc,
        Key::Delete => KeyId::Delete,
        Key::Insert => KeyId::Insert,
        Key::Home => KeyId::Home,
        Key::End => KeyId::End,
        Key::PageUp => KeyId::PageUp,
        Key::PageDown => KeyId::PageDown,
        Key::UpArrow => KeyId::Up,
        Key::DownArrow => KeyId::Down,
        Key::LeftArrow => KeyId::Left,
        Key::RightArrow => KeyId::Right,
        Key::CapsLock => KeyId::CapsLock,
        Key::NumLock => KeyId::NumLock,
        Key::ScrollLock => KeyId::ScrollLock,
        Key::PrintScreen => KeyId::PrintScreen,
        Key::Pause => KeyId::Pause,
        other => KeyId::unnamed(&format!("{:?}", other)),
    }
}

/// Map a key identifier to the rdev key that produces it
pub fn key_id_to_rdev(key: &KeyId) -> Option<Key> {
    let mapped = match key {
        KeyId::Ctrl => Key::ControlLeft,
        KeyId::Shift => Key::ShiftLeft,
        KeyId::Alt => Key::Alt,
        KeyId::Meta => Key::MetaLeft,
        KeyId::Enter => Key::Return,
        KeyId::Space => Key::Space,
        KeyId::Tab => Key::Tab,
        KeyId::Backspace => Key::Backspace,
        KeyId::Esc => Key::Escape,
        KeyId::Delete => Key::Delete,
        KeyId::Insert => Key::Insert,
        KeyId::Home => Key::Home,
        KeyId::End => Key::End,
        KeyId::PageUp => Key::PageUp,
        KeyId::PageDown => Key::PageDown,
        KeyId::Up => Key::UpArrow,
        KeyId::Down => Key::DownArrow,
        KeyId::Left => Key::LeftArrow,
        KeyId::Right => Key::RightArrow,
        KeyId::CapsLock => Key::CapsLock,
        KeyId::NumLock => Key::NumLock,
        KeyId::ScrollLock => Key::ScrollLock,
        KeyId::PrintScreen => Key::PrintScreen,
        KeyId::Pause => Key::Pause,
        KeyId::Menu => return None,
        KeyId::F(n) => *FUNCTION_KEYS.get((*n as usize).checked_sub(1)?)?,
        KeyId::Char(c) => {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() {
                LETTER_KEYS[(c as u8 - b'a') as usize]
            } else if c.is_ascii_digit() {
                DIGIT_KEYS[(c as u8 - b'0') as usize]
            } else {
                return PUNCTUATION_KEYS
                    .iter()
                    .find(|(p, _)| *p == c)
                    .map(|(_, k)| *k);
            }
        }
        KeyId::Other(_) => match key.device_name().unwrap_or_default() {
            "kpminus" => Key::KpMinus,
            "kpplus" => Key::KpPlus,
            "kpreturn" | "kpenter" => Key::KpReturn,
            "function" | "fn" => Key::Function,
            _ => return None,
        },
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdev_key_mapping() {
        assert_eq!(key_id_from_rdev(Key::KeyC), KeyId::Char('c'));
        assert_eq!(key_id_from_rdev(Key::ControlRight), KeyId::Ctrl);
        assert_eq!(key_id_from_rdev(Key::F5), KeyId::F(5));
        assert_eq!(key_id_to_rdev(&KeyId::Char('7')), Some(Key::Num7));
        assert_eq!(key_id_to_rdev(&KeyId::F(13)), None);
        assert_eq!(key_id_to_rdev(&KeyId::Char('é')), None);
    }

    #[test]
    fn test_unnamed_rdev_keys_survive_reload() {
        for key in [Key::KpMinus, Key::Function, Key::Unknown(65), Key::IntlBackslash] {
            let captured = key_id_from_rdev(key);
            let json = serde_json::to_string(&captured).unwrap();
            assert_eq!(serde_json::from_str::<KeyId>(&json).unwrap(), captured);
        }
        assert_eq!(key_id_to_rdev(&key_id_from_rdev(Key::KpMinus)), Some(Key::KpMinus));
    }
}
