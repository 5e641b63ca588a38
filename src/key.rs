//! Key identifiers and hotkey combinations
//!
//! Keys are named by semantic strings ("ctrl", "a", "space"). Known names
//! parse into typed variants; any other non-empty name is kept verbatim as
//! [`KeyId::Other`] so vendor-specific names survive a save/load round trip.
//!
//! Left and right variants of a modifier name the same key here: a pattern
//! records "ctrl", not which of the two ctrl keys was pressed.

use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Identifier for one physical key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyId {
    Ctrl,
    Shift,
    Alt,
    Meta,
    Enter,
    Space,
    Tab,
    Backspace,
    Esc,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    CapsLock,
    NumLock,
    ScrollLock,
    PrintScreen,
    Pause,
    Menu,
    /// Function key F1-F24
    F(u8),
    /// Single printable character key (letters are lowercase)
    Char(char),
    /// Unrecognized key name, preserved as given
    Other(String),
}

/// Marks a device key name that would otherwise read back as an alias
pub const UNNAMED_PREFIX: &str = "raw:";

impl KeyId {
    /// Identifier for a device key that has no typed variant
    ///
    /// The name is lowercased with whitespace and '+' replaced by '_'. When
    /// that name would parse as a different key (evdev's "next" is not
    /// page down) it is stored as `raw:<name>` instead.
    pub fn unnamed(name: &str) -> KeyId {
        let name: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() || c == '+' { '_' } else { c })
            .collect();
        match name.parse::<KeyId>() {
            Ok(KeyId::Other(parsed)) if parsed == name => KeyId::Other(name),
            _ => KeyId::Other(format!("{}{}", UNNAMED_PREFIX, name)),
        }
    }

    /// Device name of an [`KeyId::Other`] key, without the `raw:` marker
    pub fn device_name(&self) -> Option<&str> {
        match self {
            KeyId::Other(name) => Some(name.strip_prefix(UNNAMED_PREFIX).unwrap_or(name)),
            _ => None,
        }
    }
}

/// Collapse a key name for alias lookup: lowercase, no KEY_ prefix, no separators
fn compact(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let lower = lower.strip_prefix("key_").unwrap_or(&lower);
    lower
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect()
}

fn named_key(compact: &str) -> Option<KeyId> {
    let key = match compact {
        "ctrl" | "control" | "leftctrl" | "rightctrl" | "lctrl" | "rctrl" | "leftcontrol"
        | "rightcontrol" => KeyId::Ctrl,
        "shift" | "leftshift" | "rightshift" | "lshift" | "rshift" => KeyId::Shift,
        "alt" | "leftalt" | "rightalt" | "lalt" | "ralt" | "altgr" | "option" | "opt" => {
            KeyId::Alt
        }
        "meta" | "super" | "win" | "windows" | "leftwindows" | "rightwindows" | "cmd"
        | "command" | "leftmeta" | "rightmeta" | "lmeta" | "rmeta" => KeyId::Meta,
        "enter" | "return" => KeyId::Enter,
        "space" | "spacebar" => KeyId::Space,
        "tab" => KeyId::Tab,
        "backspace" => KeyId::Backspace,
        "esc" | "escape" => KeyId::Esc,
        "delete" | "del" => KeyId::Delete,
        "insert" | "ins" => KeyId::Insert,
        "home" => KeyId::Home,
        "end" => KeyId::End,
        "pageup" | "pgup" | "prior" => KeyId::PageUp,
        "pagedown" | "pgdn" | "next" => KeyId::PageDown,
        "up" | "uparrow" => KeyId::Up,
        "down" | "downarrow" => KeyId::Down,
        "left" | "leftarrow" => KeyId::Left,
        "right" | "rightarrow" => KeyId::Right,
        "capslock" => KeyId::CapsLock,
        "numlock" => KeyId::NumLock,
        "scrolllock" => KeyId::ScrollLock,
        "printscreen" | "print" | "prtsc" | "sysrq" => KeyId::PrintScreen,
        "pause" | "break" => KeyId::Pause,
        "menu" | "apps" | "compose" => KeyId::Menu,
        "plus" => KeyId::Char('+'),
        "minus" => KeyId::Char('-'),
        _ => return function_key(compact),
    };
    Some(key)
}

fn function_key(compact: &str) -> Option<KeyId> {
    let digits = compact.strip_prefix('f')?;
    match digits.parse::<u8>() {
        Ok(n @ 1..=24) => Some(KeyId::F(n)),
        _ => None,
    }
}

impl FromStr for KeyId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }

        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(KeyId::Char(c.to_ascii_lowercase()));
        }

        if trimmed.contains('+') {
            return Err(KeyError::Separator(trimmed.to_string()));
        }

        if let Some(key) = named_key(&compact(trimmed)) {
            return Ok(key);
        }
        if trimmed.contains(char::is_whitespace) {
            return Err(KeyError::Whitespace(trimmed.to_string()));
        }
        Ok(KeyId::Other(trimmed.to_string()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyId::Ctrl => "ctrl",
            KeyId::Shift => "shift",
            KeyId::Alt => "alt",
            KeyId::Meta => "meta",
            KeyId::Enter => "enter",
            KeyId::Space => "space",
            KeyId::Tab => "tab",
            KeyId::Backspace => "backspace",
            KeyId::Esc => "esc",
            KeyId::Delete => "delete",
            KeyId::Insert => "insert",
            KeyId::Home => "home",
            KeyId::End => "end",
            KeyId::PageUp => "pageup",
            KeyId::PageDown => "pagedown",
            KeyId::Up => "up",
            KeyId::Down => "down",
            KeyId::Left => "left",
            KeyId::Right => "right",
            KeyId::CapsLock => "capslock",
            KeyId::NumLock => "numlock",
            KeyId::ScrollLock => "scrolllock",
            KeyId::PrintScreen => "printscreen",
            KeyId::Pause => "pause",
            KeyId::Menu => "menu",
            KeyId::F(n) => return write!(f, "f{}", n),
            KeyId::Char('+') => "plus",
            KeyId::Char(c) => return write!(f, "{}", c),
            KeyId::Other(name) => name,
        };
        f.write_str(name)
    }
}

impl TryFrom<String> for KeyId {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyId> for String {
    fn from(key: KeyId) -> Self {
        key.to_string()
    }
}

/// A global key combination such as `ctrl+alt+1`
///
/// Equality ignores the order keys were written in: `alt+ctrl+1` and
/// `ctrl+alt+1` are the same combination.
#[derive(Debug, Clone)]
pub struct Hotkey {
    keys: Vec<KeyId>,
}

impl Hotkey {
    /// Keys in the order they were written
    pub fn keys(&self) -> &[KeyId] {
        &self.keys
    }

    /// The set of keys that must be held together
    pub fn key_set(&self) -> BTreeSet<KeyId> {
        self.keys.iter().cloned().collect()
    }

    /// Whether `key` takes part in this combination
    pub fn contains(&self, key: &KeyId) -> bool {
        self.keys.contains(key)
    }

    /// True when exactly this combination's keys are held
    pub fn is_held(&self, held: &HashSet<KeyId>) -> bool {
        held.len() == self.keys.len() && self.keys.iter().all(|k| held.contains(k))
    }
}

impl PartialEq for Hotkey {
    fn eq(&self, other: &Self) -> bool {
        self.key_set() == other.key_set()
    }
}

impl Eq for Hotkey {}

impl FromStr for Hotkey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let combo = s.trim();
        let invalid = |reason: &str| KeyError::Combination {
            combo: combo.to_string(),
            reason: reason.to_string(),
        };

        if combo.is_empty() {
            return Err(invalid("combination is empty"));
        }

        let mut keys: Vec<KeyId> = Vec::new();
        for part in combo.split('+') {
            if part.trim().is_empty() {
                return Err(invalid("empty key between '+' separators"));
            }
            let key: KeyId = part.parse().map_err(|e: KeyError| invalid(&e.to_string()))?;
            if keys.contains(&key) {
                return Err(invalid(&format!("key '{}' appears twice", key)));
            }
            keys.push(key);
        }

        Ok(Self { keys })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.keys.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("+"))
    }
}
