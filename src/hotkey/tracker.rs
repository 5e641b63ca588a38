//! Held-key bookkeeping for combination matching

use crate::input::{KeyState, KeyTransition};
use crate::key::KeyId;
use std::collections::{HashMap, HashSet};

/// Keys currently held down
///
/// Counts presses per key so that releasing one of two physical keys that
/// share an identifier (left and right ctrl) keeps the key held.
#[derive(Debug, Default)]
pub struct HeldKeys {
    counts: HashMap<KeyId, u32>,
}

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transition; returns true for a fresh press
    pub fn apply(&mut self, transition: &KeyTransition) -> bool {
        match transition.state {
            KeyState::Down => {
                *self.counts.entry(transition.key.clone()).or_insert(0) += 1;
                true
            }
            KeyState::Up => {
                if let Some(count) = self.counts.get_mut(&transition.key) {
                    *count -= 1;
                    if *count == 0 {
                        self.counts.remove(&transition.key);
                    }
                }
                false
            }
            KeyState::Repeat => false,
        }
    }

    pub fn held(&self) -> HashSet<KeyId> {
        self.counts.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
