//! Global hotkey dispatch
//!
//! The dispatcher keeps a registry of pattern name -> key combination and
//! watches a stream of key transitions. When a key press makes the set of
//! held keys equal to a binding's combination, that binding's pattern is
//! replayed on the blocking pool; the trigger loop never waits for it.
//!
//! A binding whose previous replay is still running ignores new triggers.
//! Different bindings replay in parallel.
//!
//! The dispatcher opens its own long-lived listener through
//! [`HotkeyDispatcher::start`]; it does not interfere with captures, which
//! install a separate temporary listener.

pub mod tracker;

pub use tracker::HeldKeys;

use crate::error::{InputError, KeyError};
use crate::input::{InputSource, KeyListener, KeyTransition};
use crate::key::{Hotkey, KeyId};
use crate::pattern::Pattern;
use crate::replay::ReplayEngine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

struct Binding {
    hotkey: Hotkey,
    events: Vec<KeyId>,
    busy: Arc<AtomicBool>,
}

/// Clears a binding's busy flag when its replay ends, even on panic
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Parse `hotkey` and make sure no other name holds the combination
fn check_binding(
    bindings: &HashMap<String, Binding>,
    name: &str,
    hotkey: &str,
) -> Result<Hotkey, String> {
    if name.is_empty() {
        return Err("pattern name is empty".to_string());
    }
    if hotkey.trim().is_empty() {
        return Err("combination is empty".to_string());
    }

    let hotkey: Hotkey = hotkey.parse().map_err(|e: KeyError| e.to_string())?;
    match bindings
        .iter()
        .find(|(other, b)| other.as_str() != name && b.hotkey == hotkey)
    {
        Some((other, _)) => Err(format!("{} is already bound to '{}'", hotkey, other)),
        None => Ok(hotkey),
    }
}

/// Maps key combinations to pattern replays
pub struct HotkeyDispatcher {
    replay: ReplayEngine,
    bindings: Mutex<HashMap<String, Binding>>,
}

impl HotkeyDispatcher {
    pub fn new(replay: ReplayEngine) -> Self {
        Self {
            replay,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    fn bindings_lock(&self) -> MutexGuard<'_, HashMap<String, Binding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `hotkey` to replay `events` under `name`
    ///
    /// Returns false for an empty or malformed combination, or one already
    /// bound to a different name. Registering a name again replaces its
    /// previous combination; a replay already running for that name still
    /// blocks new triggers until it ends.
    pub fn register(&self, name: &str, hotkey: &str, events: Vec<KeyId>) -> bool {
        let name = name.trim();
        let mut bindings = self.bindings_lock();
        let hotkey = match check_binding(&bindings, name, hotkey) {
            Ok(hotkey) => hotkey,
            Err(reason) => {
                tracing::warn!("Cannot bind '{}': {}", name, reason);
                return false;
            }
        };

        tracing::info!("Bound {} to pattern '{}'", hotkey, name);
        let busy = bindings
            .get(name)
            .map(|previous| previous.busy.clone())
            .unwrap_or_default();
        bindings.insert(
            name.to_string(),
            Binding {
                hotkey,
                events,
                busy,
            },
        );
        true
    }

    /// Whether [`register`](Self::register) would accept this binding now
    pub fn can_register(&self, name: &str, hotkey: &str) -> bool {
        check_binding(&self.bindings_lock(), name.trim(), hotkey).is_ok()
    }

    /// Remove the binding for `name`; true if there was one
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.bindings_lock().remove(name.trim()).is_some();
        if removed {
            tracing::info!("Unbound pattern '{}'", name.trim());
        }
        removed
    }

    /// Current bindings as (name, combination), sorted by name
    pub fn bindings(&self) -> Vec<(String, String)> {
        let mut list: Vec<_> = self
            .bindings_lock()
            .iter()
            .map(|(name, b)| (name.clone(), b.hotkey.to_string()))
            .collect();
        list.sort();
        list
    }

    /// Re-register every pattern that carries a hotkey
    ///
    /// Returns how many bindings were made. Failures are logged and skipped.
    pub fn restore(&self, patterns: &[Pattern]) -> usize {
        let restored = patterns
            .iter()
            .filter_map(|p| p.hotkey.as_deref().map(|h| (p, h)))
            .filter(|(p, hotkey)| self.register(&p.name, hotkey, p.events.clone()))
            .count();
        tracing::debug!("Restored {} hotkey binding(s)", restored);
        restored
    }

    /// Open a dedicated listener on `source` and run the trigger loop on it
    pub fn start(self: &Arc<Self>, source: &dyn InputSource) -> Result<JoinHandle<()>, InputError> {
        let listener = source.listen()?;
        tracing::info!("Hotkey listener started via {}", source.name());
        Ok(tokio::spawn(Arc::clone(self).run(listener)))
    }

    /// Trigger loop; ends when the listener's producer goes away
    pub async fn run(self: Arc<Self>, mut listener: KeyListener) {
        let mut held = HeldKeys::new();
        while let Some(transition) = listener.recv().await {
            self.handle_transition(&mut held, &transition);
        }
        tracing::debug!("Hotkey listener closed");
    }

    /// Update `held` and fire every binding the transition completes
    ///
    /// Returns the names whose replay was started. Must be called inside a
    /// tokio runtime.
    pub fn handle_transition(&self, held: &mut HeldKeys, transition: &KeyTransition) -> Vec<String> {
        if !held.apply(transition) {
            return Vec::new();
        }

        let pressed = held.held();
        let bindings = self.bindings_lock();
        let mut fired = Vec::new();
        for (name, binding) in bindings.iter() {
            if !binding.hotkey.contains(&transition.key) || !binding.hotkey.is_held(&pressed) {
                continue;
            }
            if binding.busy.swap(true, Ordering::SeqCst) {
                tracing::debug!("Pattern '{}' still replaying, trigger ignored", name);
                continue;
            }

            tracing::info!("Hotkey {} triggered pattern '{}'", binding.hotkey, name);
            let guard = BusyGuard(binding.busy.clone());
            let engine = self.replay.clone();
            let events = binding.events.clone();
            let pattern = name.clone();
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                match engine.replay(&events) {
                    Ok(report) if !report.is_complete() => tracing::warn!(
                        "Pattern '{}' replayed with {} failed key(s)",
                        pattern,
                        report.failed.len()
                    ),
                    Ok(_) => tracing::debug!("Pattern '{}' replayed", pattern),
                    Err(e) => tracing::error!("Replay of '{}' failed: {}", pattern, e),
                }
            });
            fired.push(name.clone());
        }
        fired
    }
}
