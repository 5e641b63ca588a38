//! Timed key capture
//!
//! A capture installs a broad key listener for a fixed window and records
//! every key press in arrival order. Only one capture runs at a time: the
//! listener is owned by a [`HookLease`] taken from the engine, and a second
//! request while a lease is out fails with [`UniforgeError::Busy`].
//!
//! Missing input permission is not an error. The capture returns no events
//! and a warning telling the user how to grant access.

use crate::error::{Result, UniforgeError};
use crate::input::{InputSource, KeyListener, KeyState};
use crate::key::KeyId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Shortest capture window in seconds
pub const MIN_DURATION_SECS: f64 = 1.0;

/// Longest capture window in seconds
pub const MAX_DURATION_SECS: f64 = 30.0;

/// Capture window used when none (or NaN) is given
pub const DEFAULT_DURATION_SECS: f64 = 3.0;

/// Clamp a requested window into the supported range
pub fn clamp_duration(secs: f64) -> f64 {
    if secs.is_nan() {
        return DEFAULT_DURATION_SECS;
    }
    secs.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
}

/// Result of one capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureOutcome {
    /// Pressed keys in arrival order
    pub events: Vec<KeyId>,

    /// Window actually used, in seconds
    pub duration: f64,

    /// Set when nothing could be recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Exclusive use of the capture hook
///
/// Dropping the lease uninstalls the listener and lets the next capture in.
pub struct HookLease {
    listener: Option<KeyListener>,
    _guard: OwnedMutexGuard<()>,
}

impl HookLease {
    fn install(&mut self, source: &dyn InputSource) -> std::result::Result<(), String> {
        match source.listen() {
            Ok(listener) => {
                self.listener = Some(listener);
                Ok(())
            }
            Err(e) => Err(e.remediation()),
        }
    }
}

/// Records key presses for bounded windows
pub struct CaptureEngine {
    source: Arc<dyn InputSource>,
    hook: Arc<Mutex<()>>,
}

impl CaptureEngine {
    pub fn new(source: Arc<dyn InputSource>) -> Self {
        Self {
            source,
            hook: Arc::new(Mutex::new(())),
        }
    }

    /// Take the capture hook, failing immediately if it is in use
    pub fn lease(&self) -> Result<HookLease> {
        let guard = self
            .hook
            .clone()
            .try_lock_owned()
            .map_err(|_| UniforgeError::Busy)?;
        Ok(HookLease {
            listener: None,
            _guard: guard,
        })
    }

    /// Whether a capture is currently running
    pub fn is_busy(&self) -> bool {
        self.hook.try_lock().is_err()
    }

    /// Record key presses for `secs` seconds (clamped to 1..=30)
    pub async fn capture(&self, secs: f64) -> Result<CaptureOutcome> {
        let duration = clamp_duration(secs);
        let mut lease = self.lease()?;

        tracing::info!(
            "Capturing keys for {:.1}s via {}",
            duration,
            self.source.name()
        );

        if let Err(warning) = lease.install(self.source.as_ref()) {
            tracing::warn!("Capture listener not installed: {}", warning);
            return Ok(CaptureOutcome {
                events: Vec::new(),
                duration,
                warning: Some(warning),
            });
        }

        let deadline = Instant::now() + Duration::from_secs_f64(duration);
        let mut events = Vec::new();
        let mut warning = None;

        if let Some(listener) = lease.listener.as_mut() {
            loop {
                match tokio::time::timeout_at(deadline, listener.recv()).await {
                    Ok(Some(transition)) => {
                        if transition.state == KeyState::Down {
                            tracing::debug!("Captured key: {}", transition.key);
                            events.push(transition.key);
                        }
                    }
                    Ok(None) => {
                        tracing::warn!("Key listener stopped before the capture window ended");
                        warning = Some(
                            "Key listener stopped early; the capture may be incomplete."
                                .to_string(),
                        );
                        tokio::time::sleep_until(deadline).await;
                        break;
                    }
                    Err(_) => break,
                }
            }
        }

        drop(lease);
        tracing::info!("Capture finished: {} key(s)", events.len());

        Ok(CaptureOutcome {
            events,
            duration,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ChannelSource, KeyTransition};

    async fn wait_for_listener(source: &ChannelSource) {
        while source.listener_count() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_clamp_duration() {
        assert_eq!(clamp_duration(0.0), 1.0);
        assert_eq!(clamp_duration(-5.0), 1.0);
        assert_eq!(clamp_duration(100.0), 30.0);
        assert_eq!(clamp_duration(2.5), 2.5);
        assert_eq!(clamp_duration(f64::NAN), DEFAULT_DURATION_SECS);
        assert_eq!(clamp_duration(f64::INFINITY), 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_records_presses_only() {
        let source = Arc::new(ChannelSource::new());
        let engine = Arc::new(CaptureEngine::new(source.clone()));

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.capture(2.0).await }
        });
        wait_for_listener(&source).await;

        source.inject(KeyTransition::down(KeyId::Ctrl));
        source.inject(KeyTransition {
            key: KeyId::Ctrl,
            state: KeyState::Repeat,
        });
        source.inject(KeyTransition::down(KeyId::Char('c')));
        source.inject(KeyTransition::up(KeyId::Char('c')));
        source.inject(KeyTransition::up(KeyId::Ctrl));

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.events, vec![KeyId::Ctrl, KeyId::Char('c')]);
        assert_eq!(outcome.duration, 2.0);
        assert!(outcome.warning.is_none());
        assert_eq!(source.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_runs_for_whole_window() {
        let source = Arc::new(ChannelSource::new());
        let engine = CaptureEngine::new(source);

        let start = Instant::now();
        let outcome = engine.capture(0.0).await.unwrap();
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.duration, 1.0);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_capture_is_busy() {
        let source = Arc::new(ChannelSource::new());
        let engine = Arc::new(CaptureEngine::new(source.clone()));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.capture(5.0).await }
        });
        wait_for_listener(&source).await;

        assert!(engine.is_busy());
        assert!(matches!(engine.capture(1.0).await, Err(UniforgeError::Busy)));

        first.await.unwrap().unwrap();
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_capture_without_permission_warns() {
        let source = Arc::new(ChannelSource::new());
        source.deny_access("/dev/input/event3");
        let engine = CaptureEngine::new(source);

        let outcome = engine.capture(1.0).await.unwrap();
        assert!(outcome.events.is_empty());
        let warning = outcome.warning.unwrap();
        assert!(warning.contains("input"));
        assert!(!engine.is_busy());
    }
}
