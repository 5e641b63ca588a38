//! Named key patterns and their persistent store
//!
//! A pattern is an ordered list of keys plus an optional hotkey. The name is
//! the only identity: writing a pattern under an existing name replaces its
//! keys and hotkey in place, keeping its position in the sequence.
//!
//! Every mutation loads the current sequence, edits it and writes it back
//! while holding the store lock, so two overlapping upserts cannot lose
//! each other's changes.

pub mod storage;

pub use storage::{JsonFileStorage, MemoryStorage, PatternStorage};

use crate::error::{Result, StorageError, UniforgeError};
use crate::key::KeyId;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A named, replayable key sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,

    /// Keys in recording order
    #[serde(rename = "pattern")]
    pub events: Vec<KeyId>,

    /// Global combination that replays this pattern (stored as "" when unset)
    #[serde(default, with = "hotkey_field")]
    pub hotkey: Option<String>,
}

impl Pattern {
    pub fn new(name: impl Into<String>, events: Vec<KeyId>, hotkey: Option<String>) -> Self {
        Self {
            name: name.into(),
            events,
            hotkey: normalize_hotkey(hotkey),
        }
    }
}

/// Treat blank hotkey strings as "no hotkey"
pub fn normalize_hotkey(hotkey: Option<String>) -> Option<String> {
    hotkey
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

mod hotkey_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(super::normalize_hotkey(raw))
    }
}

/// Durable mapping of name to pattern
pub struct PatternStore {
    storage: Mutex<Box<dyn PatternStorage>>,
}

impl PatternStore {
    pub fn new(storage: Box<dyn PatternStorage>) -> Self {
        tracing::debug!("Pattern store: {}", storage.describe());
        Self {
            storage: Mutex::new(storage),
        }
    }

    fn storage(&self) -> MutexGuard<'_, Box<dyn PatternStorage>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read all patterns. Missing or unreadable storage reads as empty.
    pub fn load(&self) -> Vec<Pattern> {
        let storage = self.storage();
        match storage.load() {
            Ok(patterns) => patterns,
            Err(e) => {
                tracing::warn!("Could not load patterns from {}: {}", storage.describe(), e);
                Vec::new()
            }
        }
    }

    /// All patterns in insertion order
    pub fn list(&self) -> Vec<Pattern> {
        self.load()
    }

    /// Replace the stored sequence
    pub fn save(&self, patterns: &[Pattern]) -> std::result::Result<(), StorageError> {
        let storage = self.storage();
        storage.save(patterns).inspect_err(|e| {
            tracing::error!("Could not save patterns to {}: {}", storage.describe(), e);
        })
    }

    /// Insert a pattern, or replace the keys and hotkey of the one named `name`
    ///
    /// Returns the sequence as written.
    pub fn upsert(
        &self,
        name: &str,
        events: Vec<KeyId>,
        hotkey: Option<String>,
    ) -> Result<Vec<Pattern>> {
        let name = validate_name(name)?;
        let hotkey = normalize_hotkey(hotkey);

        self.modify(|patterns| {
            match patterns.iter_mut().find(|p| p.name == name) {
                Some(existing) => {
                    tracing::debug!("Updating pattern '{}' ({} keys)", name, events.len());
                    existing.events = events;
                    existing.hotkey = hotkey;
                }
                None => {
                    tracing::debug!("Adding pattern '{}' ({} keys)", name, events.len());
                    patterns.push(Pattern {
                        name: name.to_string(),
                        events,
                        hotkey,
                    });
                }
            }
            true
        })
    }

    /// Remove the pattern named `name`; removing an absent name is not an error
    pub fn delete(&self, name: &str) -> Result<Vec<Pattern>> {
        let name = name.trim();
        self.modify(|patterns| {
            let before = patterns.len();
            patterns.retain(|p| p.name != name);
            let removed = patterns.len() != before;
            if removed {
                tracing::debug!("Deleted pattern '{}'", name);
            } else {
                tracing::debug!("Pattern '{}' not present, nothing to delete", name);
            }
            removed
        })
    }

    /// Set only the hotkey of an existing pattern
    pub fn set_hotkey(&self, name: &str, hotkey: Option<String>) -> Result<Vec<Pattern>> {
        let name = validate_name(name)?;
        let hotkey = normalize_hotkey(hotkey);
        let mut found = false;
        let patterns = self.modify(|patterns| {
            if let Some(existing) = patterns.iter_mut().find(|p| p.name == name) {
                found = true;
                existing.hotkey = hotkey;
            }
            found
        })?;
        if found {
            Ok(patterns)
        } else {
            Err(UniforgeError::NotFound(name.to_string()))
        }
    }

    /// Look up a pattern by name
    pub fn find(&self, name: &str) -> Result<Pattern> {
        let name = name.trim();
        self.load()
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| UniforgeError::NotFound(name.to_string()))
    }

    /// Load, edit and write back under the store lock
    ///
    /// `edit` returns whether it changed anything; unchanged sequences are
    /// not rewritten. Unlike [`PatternStore::load`], a read failure aborts the
    /// mutation so a corrupt file is never overwritten with a partial view.
    fn modify<F>(&self, edit: F) -> Result<Vec<Pattern>>
    where
        F: FnOnce(&mut Vec<Pattern>) -> bool,
    {
        let storage = self.storage();
        let mut patterns = storage.load()?;
        if edit(&mut patterns) {
            storage.save(&patterns).inspect_err(|e| {
                tracing::error!("Could not save patterns to {}: {}", storage.describe(), e);
            })?;
        }
        Ok(patterns)
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(UniforgeError::InvalidArgument(
            "pattern name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn keys(names: &[&str]) -> Vec<KeyId> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    fn store() -> PatternStore {
        PatternStore::new(Box::new(MemoryStorage::new()))
    }

    #[test]
    fn test_upsert_appends_then_replaces_in_place() {
        let store = store();
        store.upsert("A", keys(&["a"]), Some("ctrl+1".into())).unwrap();
        store.upsert("B", keys(&["b"]), None).unwrap();
        let patterns = store
            .upsert("A", keys(&["x", "y"]), Some("ctrl+2".into()))
            .unwrap();

        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].name, "A");
        assert_eq!(patterns[0].events, keys(&["x", "y"]));
        assert_eq!(patterns[0].hotkey.as_deref(), Some("ctrl+2"));
        assert_eq!(patterns[1].name, "B");
        assert_eq!(store.load(), patterns);
    }

    #[test]
    fn test_upsert_rejects_empty_name() {
        let store = store();
        let err = store.upsert("  ", keys(&["a"]), None).unwrap_err();
        assert!(matches!(err, UniforgeError::InvalidArgument(_)));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_upsert_allows_empty_events() {
        let store = store();
        let patterns = store.upsert("noop", Vec::new(), None).unwrap();
        assert!(patterns[0].events.is_empty());
    }

    #[test]
    fn test_blank_hotkey_is_none() {
        let store = store();
        let patterns = store.upsert("copy", keys(&["ctrl", "c"]), Some(" ".into())).unwrap();
        assert_eq!(patterns[0].hotkey, None);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = store();
        store.upsert("keep", keys(&["a"]), None).unwrap();
        let first = store.delete("missing").unwrap();
        let second = store.delete("missing").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);

        assert!(store.delete("keep").unwrap().is_empty());
        assert!(store.delete("keep").unwrap().is_empty());
    }

    #[test]
    fn test_find() {
        let store = store();
        store.upsert("copy", keys(&["ctrl", "c"]), None).unwrap();
        assert_eq!(store.find("copy").unwrap().events, keys(&["ctrl", "c"]));
        assert!(matches!(
            store.find("nope"),
            Err(UniforgeError::NotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_set_hotkey() {
        let store = store();
        store.upsert("copy", keys(&["ctrl", "c"]), None).unwrap();
        let patterns = store.set_hotkey("copy", Some("ctrl+alt+c".into())).unwrap();
        assert_eq!(patterns[0].hotkey.as_deref(), Some("ctrl+alt+c"));
        assert!(matches!(
            store.set_hotkey("nope", Some("f5".into())),
            Err(UniforgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_save_load_round_trip_preserves_order() {
        let store = store();
        for name in ["c", "a", "b"] {
            store.upsert(name, keys(&[name]), None).unwrap();
        }
        let loaded = store.load();
        store.save(&loaded).unwrap();
        let names: Vec<_> = store.load().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let storage = Arc::new(MemoryStorage::new());
        let store = PatternStore::new(Box::new(storage.clone()));
        storage.set_fail_writes(true);
        let err = store.upsert("a", keys(&["a"]), None).unwrap_err();
        assert!(matches!(err, UniforgeError::Storage(_)));
        assert!(store.save(&[]).is_err());
    }

    #[test]
    fn test_concurrent_upserts_lose_nothing() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        store
                            .upsert(&format!("p{}-{}", i, j), keys(&["a"]), None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.load().len(), 80);
    }

    #[test]
    fn test_pattern_json_layout() {
        let json = r#"{"name": "copy", "pattern": ["ctrl", "c"], "hotkey": ""}"#;
        let pattern: Pattern = serde_json::from_str(json).unwrap();
        assert_eq!(pattern.hotkey, None);
        assert_eq!(pattern.events, keys(&["ctrl", "c"]));

        let missing_hotkey: Pattern =
            serde_json::from_str(r#"{"name": "x", "pattern": []}"#).unwrap();
        assert_eq!(missing_hotkey.hotkey, None);
    }
}
