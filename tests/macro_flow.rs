//! End-to-end macro scenarios against the library API
//!
//! Keys come from a channel-backed input source and replays land in a
//! recording emitter, so these run without input devices or uinput.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uniforge::capture::CaptureEngine;
use uniforge::hotkey::HotkeyDispatcher;
use uniforge::input::{ChannelSource, KeyTransition};
use uniforge::key::KeyId;
use uniforge::output::{KeyAction, RecordingEmitter};
use uniforge::pattern::{JsonFileStorage, MemoryStorage, PatternStore};
use uniforge::replay::{ReplayEngine, KEY_DELAY};
use uniforge::UniforgeError;

fn memory_store() -> PatternStore {
    PatternStore::new(Box::new(MemoryStorage::new()))
}

/// Hold every key of a combination, then release in reverse
fn type_combination(source: &ChannelSource, keys: &[KeyId]) {
    for key in keys {
        source.inject(KeyTransition::down(key.clone()));
    }
    for key in keys.iter().rev() {
        source.inject(KeyTransition::up(key.clone()));
    }
}

async fn wait_for_presses(emitter: &RecordingEmitter, count: usize) {
    for _ in 0..200 {
        if emitter.pressed().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[test]
fn copy_pattern_lifecycle() {
    let store = memory_store();
    let emitter = Arc::new(RecordingEmitter::new());
    let replay = ReplayEngine::new(emitter.clone());

    store
        .upsert("copy", vec![KeyId::Ctrl, KeyId::Char('c')], None)
        .unwrap();
    let pattern = store.find("copy").unwrap();
    let report = replay.replay(&pattern.events).unwrap();
    assert!(report.is_complete());

    let actions: Vec<_> = emitter
        .emitted()
        .into_iter()
        .map(|e| (e.key, e.action))
        .collect();
    assert_eq!(
        actions,
        vec![
            (KeyId::Ctrl, KeyAction::Press),
            (KeyId::Ctrl, KeyAction::Release),
            (KeyId::Char('c'), KeyAction::Press),
            (KeyId::Char('c'), KeyAction::Release),
        ]
    );

    assert!(store.delete("copy").unwrap().is_empty());
    assert!(matches!(
        store.find("copy"),
        Err(UniforgeError::NotFound(_))
    ));
}

#[test]
fn replay_keeps_timing_when_keys_fail() {
    let emitter = Arc::new(RecordingEmitter::new());
    let unmapped = KeyId::Other("hyper".to_string());
    emitter.fail_on(unmapped.clone());
    let replay = ReplayEngine::new(emitter.clone());

    let start = std::time::Instant::now();
    let report = replay
        .replay(&[KeyId::Char('a'), unmapped, KeyId::Char('b')])
        .unwrap();
    assert!(start.elapsed() >= KEY_DELAY * 3);
    assert_eq!(report.emitted, 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(emitter.pressed(), vec![KeyId::Char('a'), KeyId::Char('b')]);
}

#[test]
fn patterns_survive_restart_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("patterns.json");

    {
        let store = PatternStore::new(Box::new(JsonFileStorage::new(&path)));
        store
            .upsert("zeta", vec![KeyId::Char('z')], Some("f13".to_string()))
            .unwrap();
        store.upsert("alpha", vec![KeyId::Char('a')], None).unwrap();
        store
            .upsert("zeta", vec![KeyId::Char('y')], Some("f13".to_string()))
            .unwrap();
    }

    let store = PatternStore::new(Box::new(JsonFileStorage::new(&path)));
    let patterns = store.list();
    let names: Vec<_> = patterns.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
    assert_eq!(patterns[0].events, vec![KeyId::Char('y')]);

    let dispatcher = HotkeyDispatcher::new(ReplayEngine::new(Arc::new(RecordingEmitter::new())));
    assert_eq!(dispatcher.restore(&patterns), 1);
    assert_eq!(
        dispatcher.bindings(),
        vec![("zeta".to_string(), "f13".to_string())]
    );
}

#[tokio::test]
async fn rebinding_only_latest_combination_fires() {
    let emitter = Arc::new(RecordingEmitter::new());
    let dispatcher = Arc::new(HotkeyDispatcher::new(ReplayEngine::new(emitter.clone())));
    let source = ChannelSource::new();
    let task = dispatcher.start(&source).unwrap();

    let events = vec![KeyId::Char('p')];
    assert!(dispatcher.register("p", "ctrl+alt+1", events.clone()));
    assert!(dispatcher.register("p", "ctrl+alt+2", events));

    type_combination(&source, &[KeyId::Ctrl, KeyId::Alt, KeyId::Char('1')]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(emitter.pressed().is_empty());

    type_combination(&source, &[KeyId::Ctrl, KeyId::Alt, KeyId::Char('2')]);
    wait_for_presses(&emitter, 1).await;
    assert_eq!(emitter.pressed(), vec![KeyId::Char('p')]);

    task.abort();
}

#[tokio::test]
async fn distinct_bindings_replay_independently() {
    let emitter = Arc::new(RecordingEmitter::new());
    let dispatcher = Arc::new(HotkeyDispatcher::new(ReplayEngine::new(emitter.clone())));
    let source = ChannelSource::new();
    let task = dispatcher.start(&source).unwrap();

    dispatcher.register("a", "f13", vec![KeyId::Char('a'); 5]);
    dispatcher.register("b", "f14", vec![KeyId::Char('b'); 5]);

    type_combination(&source, &[KeyId::F(13)]);
    type_combination(&source, &[KeyId::F(14)]);
    wait_for_presses(&emitter, 10).await;

    let pressed = emitter.pressed();
    assert_eq!(pressed.iter().filter(|k| **k == KeyId::Char('a')).count(), 5);
    assert_eq!(pressed.iter().filter(|k| **k == KeyId::Char('b')).count(), 5);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn capture_then_save_then_replay() {
    let source = Arc::new(ChannelSource::new());
    let capture = Arc::new(CaptureEngine::new(source.clone()));
    let store = memory_store();
    let emitter = Arc::new(RecordingEmitter::new());
    let replay = ReplayEngine::new(emitter.clone());

    let task = tokio::spawn({
        let capture = capture.clone();
        async move { capture.capture(3.0).await }
    });
    while source.listener_count() == 0 {
        tokio::task::yield_now().await;
    }
    type_combination(&source, &[KeyId::Ctrl, KeyId::Char('v')]);

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.duration, 3.0);
    assert_eq!(outcome.events, vec![KeyId::Ctrl, KeyId::Char('v')]);

    store.upsert("paste", outcome.events, None).unwrap();
    let pattern = store.find("paste").unwrap();
    replay.replay_async(pattern.events).await.unwrap();
    assert_eq!(emitter.pressed(), vec![KeyId::Ctrl, KeyId::Char('v')]);
}

#[tokio::test]
async fn capture_without_permission_returns_warning() {
    let source = Arc::new(ChannelSource::new());
    source.deny_access("/dev/input/event0");
    let capture = CaptureEngine::new(source);

    let outcome = capture.capture(5.0).await.unwrap();
    assert!(outcome.events.is_empty());
    assert!(outcome.warning.is_some_and(|w| !w.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn capture_duration_is_clamped() {
    let capture = CaptureEngine::new(Arc::new(ChannelSource::new()));
    assert_eq!(capture.capture(0.0).await.unwrap().duration, 1.0);
    assert_eq!(capture.capture(100.0).await.unwrap().duration, 30.0);
}
