//! Global key event listening
//!
//! An [`InputSource`] is the process's access to the OS keyboard hook. Each
//! call to [`InputSource::listen`] installs one listener and returns a
//! [`KeyListener`] handle; key transitions arrive on the handle's channel
//! until it is dropped, which uninstalls the listener.
//!
//! On Linux, listening uses evdev at the kernel input level, which works on
//! every Wayland compositor and on X11. The user must be in the 'input'
//! group. Other platforms use rdev.
//!
//! [`ChannelSource`] feeds injected transitions instead of a device, so the
//! capture and hotkey logic can be exercised without real hardware.

#[cfg(target_os = "linux")]
pub mod evdev_source;
#[cfg(not(target_os = "linux"))]
pub mod rdev_source;

use crate::error::InputError;
use crate::key::KeyId;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// Capacity of each listener's event channel
pub const LISTENER_CHANNEL_CAPACITY: usize = 256;

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Down,
    Up,
    /// Auto-repeat while held; not a new press
    Repeat,
}

/// One observed key transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTransition {
    pub key: KeyId,
    pub state: KeyState,
}

impl KeyTransition {
    pub fn down(key: KeyId) -> Self {
        Self {
            key,
            state: KeyState::Down,
        }
    }

    pub fn up(key: KeyId) -> Self {
        Self {
            key,
            state: KeyState::Up,
        }
    }
}

/// Handle to an installed listener
///
/// Dropping the handle stops the listener.
pub struct KeyListener {
    rx: mpsc::Receiver<KeyTransition>,
    stop: Option<oneshot::Sender<()>>,
}

impl KeyListener {
    /// Wrap a channel whose producer watches `stop` to know when to quit
    pub fn new(rx: mpsc::Receiver<KeyTransition>, stop: oneshot::Sender<()>) -> Self {
        Self {
            rx,
            stop: Some(stop),
        }
    }

    /// Wrap a bare channel; the producer notices the drop when sending fails
    pub fn from_receiver(rx: mpsc::Receiver<KeyTransition>) -> Self {
        Self { rx, stop: None }
    }

    /// Next transition, or `None` once the producer has gone away
    pub async fn recv(&mut self) -> Option<KeyTransition> {
        self.rx.recv().await
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.rx.close();
    }
}

/// Access to the global keyboard hook
pub trait InputSource: Send + Sync {
    /// Install a new listener
    fn listen(&self) -> Result<KeyListener, InputError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Create the input source for this platform
#[cfg(target_os = "linux")]
pub fn create_source() -> Box<dyn InputSource> {
    Box::new(evdev_source::EvdevSource::new())
}

/// Create the input source for this platform
#[cfg(not(target_os = "linux"))]
pub fn create_source() -> Box<dyn InputSource> {
    Box::new(rdev_source::RdevSource::new())
}

/// Input source driven by [`ChannelSource::inject`] instead of a device
#[derive(Default)]
pub struct ChannelSource {
    subscribers: Mutex<Vec<mpsc::Sender<KeyTransition>>>,
    deny: Mutex<Option<String>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make listener installation fail as if input permission were missing
    pub fn deny_access(&self, reason: &str) {
        *self.deny.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
    }

    /// Deliver a transition to every installed listener; returns how many got it
    pub fn inject(&self, transition: KeyTransition) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers
            .iter()
            .filter(|tx| tx.try_send(transition.clone()).is_ok())
            .count()
    }

    /// Press and release each key in turn
    pub fn type_keys(&self, keys: &[KeyId]) {
        for key in keys {
            self.inject(KeyTransition::down(key.clone()));
            self.inject(KeyTransition::up(key.clone()));
        }
    }

    /// Number of listeners currently installed
    pub fn listener_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl InputSource for ChannelSource {
    fn listen(&self) -> Result<KeyListener, InputError> {
        if let Some(reason) = self
            .deny
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(InputError::PermissionDenied(reason));
        }

        let (tx, rx) = mpsc::channel(LISTENER_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Ok(KeyListener::from_receiver(rx))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

impl<T: InputSource + ?Sized> InputSource for std::sync::Arc<T> {
    fn listen(&self) -> Result<KeyListener, InputError> {
        (**self).listen()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_delivers_in_order() {
        let source = ChannelSource::new();
        let mut listener = source.listen().unwrap();
        source.type_keys(&[KeyId::Ctrl, KeyId::Char('c')]);

        assert_eq!(listener.recv().await, Some(KeyTransition::down(KeyId::Ctrl)));
        assert_eq!(listener.recv().await, Some(KeyTransition::up(KeyId::Ctrl)));
        assert_eq!(
            listener.recv().await,
            Some(KeyTransition::down(KeyId::Char('c')))
        );
    }

    #[test]
    fn test_dropping_listener_uninstalls_it() {
        let source = ChannelSource::new();
        let first = source.listen().unwrap();
        let second = source.listen().unwrap();
        assert_eq!(source.listener_count(), 2);
        drop(first);
        assert_eq!(source.listener_count(), 1);
        assert_eq!(source.inject(KeyTransition::down(KeyId::Space)), 1);
        drop(second);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn test_denied_access() {
        let source = ChannelSource::new();
        source.deny_access("no permission");
        assert!(matches!(
            source.listen(),
            Err(InputError::PermissionDenied(_))
        ));
    }
}
