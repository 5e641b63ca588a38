//! HTTP API tests
//!
//! Each test starts the service on an ephemeral port and calls it with the
//! blocking daemon client (or raw ureq for status codes) from the blocking
//! pool.

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use uniforge::capture::CaptureEngine;
use uniforge::client::DaemonClient;
use uniforge::config::ServiceConfig;
use uniforge::document::DocumentStore;
use uniforge::hotkey::HotkeyDispatcher;
use uniforge::input::{ChannelSource, KeyTransition};
use uniforge::key::KeyId;
use uniforge::output::RecordingEmitter;
use uniforge::pattern::{MemoryStorage, PatternStore};
use uniforge::replay::ReplayEngine;
use uniforge::service::{self, ServiceHandle, Services};
use uniforge::UniforgeError;

struct Harness {
    handle: ServiceHandle,
    services: Services,
    source: Arc<ChannelSource>,
    emitter: Arc<RecordingEmitter>,
    storage: Arc<MemoryStorage>,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ChannelSource::new());
        let emitter = Arc::new(RecordingEmitter::new());
        let storage = Arc::new(MemoryStorage::new());
        let replay = ReplayEngine::new(emitter.clone());

        let services = Services::new(
            Arc::new(PatternStore::new(Box::new(storage.clone()))),
            Arc::new(DocumentStore::new(dir.path().join("data.json"))),
            Arc::new(CaptureEngine::new(source.clone())),
            replay.clone(),
            Arc::new(HotkeyDispatcher::new(replay)),
            1.0,
        );

        let service_cfg = ServiceConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_body_bytes: 64 * 1024,
        };
        let handle = service::start(&service_cfg, services.clone())
            .await
            .unwrap();

        Self {
            handle,
            services,
            source,
            emitter,
            storage,
            _dir: dir,
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.handle.addr())
    }

    fn client(&self) -> DaemonClient {
        DaemonClient::new(self.url())
    }

    async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}

/// Status code and JSON body of a raw request
fn raw(method: &str, url: &str, body: Option<Value>) -> (u16, Value) {
    let request = ureq::request(method, url);
    let result = match body {
        Some(body) => request.send_json(body),
        None => request.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => panic!("request failed: {}", e),
    };
    let status = response.status();
    (status, response.into_json().unwrap_or(Value::Null))
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reports_ok() {
    let harness = Harness::start().await;
    let url = harness.url();

    let (status, body) = blocking(move || raw("GET", &format!("{}/health", url), None)).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "ok"}));

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn copy_scenario_over_http() {
    let harness = Harness::start().await;
    let client = harness.client();
    let url = harness.url();

    let (saved, status, after_delete, missing) = blocking(move || {
        let saved = client
            .save_pattern("copy", &[KeyId::Ctrl, KeyId::Char('c')], None)
            .unwrap();
        let status = client.replay_name("copy").unwrap();
        let after_delete = client.delete_pattern("copy").unwrap();
        let missing = raw("POST", &format!("{}/replay/name/copy", url), None);
        (saved, status, after_delete, missing)
    })
    .await;

    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].hotkey, None);
    assert_eq!(status.status, "replayed");
    assert!(status.failed.is_empty());
    assert_eq!(harness.emitter.pressed(), vec![KeyId::Ctrl, KeyId::Char('c')]);
    assert!(after_delete.is_empty());
    assert_eq!(missing.0, 404);
    assert_eq!(missing.1["error"]["type"], "not_found_error");

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replay_validation() {
    let harness = Harness::start().await;
    let url = harness.url();

    let (empty, missing, bad_key, alias) = blocking(move || {
        let replay_url = format!("{}/replay", url);
        (
            raw("POST", &replay_url, Some(json!({"pattern": []}))),
            raw("POST", &replay_url, Some(json!({}))),
            raw("POST", &replay_url, Some(json!({"pattern": ["ctrl+c"]}))),
            raw("POST", &replay_url, Some(json!({"events": ["enter"]}))),
        )
    })
    .await;

    assert_eq!(empty.0, 400);
    assert_eq!(empty.1["error"]["type"], "invalid_request_error");
    assert_eq!(missing.0, 400);
    assert_eq!(bad_key.0, 400);
    assert_eq!(alias.0, 200);
    assert_eq!(alias.1["status"], "replayed");
    assert_eq!(harness.emitter.pressed(), vec![KeyId::Enter]);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pattern_validation() {
    let harness = Harness::start().await;
    let url = harness.url();

    let (blank_name, not_array) = blocking(move || {
        let patterns_url = format!("{}/patterns", url);
        (
            raw(
                "POST",
                &patterns_url,
                Some(json!({"name": "  ", "pattern": ["a"]})),
            ),
            raw(
                "POST",
                &patterns_url,
                Some(json!({"name": "x", "pattern": "a"})),
            ),
        )
    })
    .await;

    assert_eq!(blank_name.0, 400);
    assert_eq!(not_array.0, 400);
    assert!(harness.services.store.list().is_empty());

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saving_pattern_manages_binding() {
    let harness = Harness::start().await;
    let client = harness.client();

    let first = client_call(&client, |c| {
        c.save_pattern("copy", &[KeyId::Ctrl, KeyId::Char('c')], Some("ctrl+alt+1"))
    })
    .await;
    assert_eq!(first[0].hotkey.as_deref(), Some("ctrl+alt+1"));
    assert_eq!(
        harness.services.hotkeys.bindings(),
        vec![("copy".to_string(), "ctrl+alt+1".to_string())]
    );

    client_call(&client, |c| {
        c.save_pattern("copy", &[KeyId::Ctrl, KeyId::Char('c')], None)
    })
    .await;
    assert!(harness.services.hotkeys.bindings().is_empty());

    client_call(&client, |c| {
        c.save_pattern("cut", &[KeyId::Ctrl, KeyId::Char('x')], Some("f13"))
    })
    .await;
    client_call(&client, |c| c.delete_pattern("cut")).await;
    assert!(harness.services.hotkeys.bindings().is_empty());

    harness.shutdown().await;
}

async fn client_call<T, F>(client: &DaemonClient, f: F) -> T
where
    F: FnOnce(&DaemonClient) -> Result<T, UniforgeError> + Send + 'static,
    T: Send + 'static,
{
    let client = DaemonClient::new(client.base_url());
    blocking(move || f(&client).unwrap()).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hotkey_registration() {
    let harness = Harness::start().await;
    let client = harness.client();
    let url = harness.url();

    let (missing, first, conflict, persisted) = blocking(move || {
        let missing = raw(
            "POST",
            &format!("{}/hotkey/register", url),
            Some(json!({"name": "nope", "hotkey": "f13"})),
        );
        client
            .save_pattern("a", &[KeyId::Char('a')], None)
            .unwrap();
        client
            .save_pattern("b", &[KeyId::Char('b')], None)
            .unwrap();
        let first = client.register_hotkey("a", "ctrl+alt+1").unwrap();
        let conflict = client.register_hotkey("b", "alt+ctrl+1").unwrap();
        (missing, first, conflict, client.patterns().unwrap())
    })
    .await;

    assert_eq!(missing.0, 404);
    assert!(first);
    assert!(!conflict);
    assert_eq!(persisted[0].hotkey.as_deref(), Some("ctrl+alt+1"));
    assert_eq!(persisted[1].hotkey, None);

    // The registered binding fires from the dispatcher's own listener
    let task = harness
        .services
        .hotkeys
        .start(harness.source.as_ref())
        .unwrap();
    for key in [KeyId::Ctrl, KeyId::Alt, KeyId::Char('1')] {
        harness.source.inject(KeyTransition::down(key));
    }
    for _ in 0..200 {
        if !harness.emitter.pressed().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(harness.emitter.pressed(), vec![KeyId::Char('a')]);
    task.abort();

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unbindable_hotkey_is_not_stored() {
    let harness = Harness::start().await;
    let client = harness.client();

    let saved = blocking(move || {
        client.save_pattern("b", &[KeyId::Char('b')], None).unwrap();
        client
            .save_pattern("a", &[KeyId::Char('a')], Some("f13"))
            .unwrap();
        client
            .save_pattern("b", &[KeyId::Char('b')], Some("f13"))
            .unwrap();
        client
            .save_pattern("c", &[KeyId::Char('c')], Some("ctrl+"))
            .unwrap()
    })
    .await;

    let stored: Vec<_> = saved
        .iter()
        .map(|p| (p.name.as_str(), p.hotkey.as_deref()))
        .collect();
    assert_eq!(
        stored,
        vec![("b", None), ("a", Some("f13")), ("c", None)]
    );
    let live = vec![("a".to_string(), "f13".to_string())];
    assert_eq!(harness.services.hotkeys.bindings(), live);

    // A restarted daemon binds exactly what was live before
    let restarted = HotkeyDispatcher::new(ReplayEngine::new(Arc::new(RecordingEmitter::new())));
    assert_eq!(restarted.restore(&harness.services.store.list()), 1);
    assert_eq!(restarted.bindings(), live);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_hotkey_persist_leaves_nothing_bound() {
    let harness = Harness::start().await;
    harness
        .services
        .store
        .upsert("a", vec![KeyId::Char('a')], None)
        .unwrap();
    harness.storage.set_fail_writes(true);
    let url = harness.url();

    let (status, body) = blocking(move || {
        raw(
            "POST",
            &format!("{}/hotkey/register", url),
            Some(json!({"name": "a", "hotkey": "f13"})),
        )
    })
    .await;

    assert_eq!(status, 500);
    assert_eq!(body["error"]["type"], "storage_error");
    assert!(harness.services.hotkeys.bindings().is_empty());
    assert_eq!(harness.services.store.find("a").unwrap().hotkey, None);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capture_records_and_rejects_overlap() {
    let harness = Harness::start().await;
    let first_client = harness.client();
    let second_client = harness.client();

    let first = tokio::task::spawn_blocking(move || first_client.capture(Some(2.0)));
    while harness.source.listener_count() == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let overlap = blocking(move || second_client.capture(Some(1.0))).await;
    assert!(matches!(overlap, Err(UniforgeError::Busy)));

    harness.source.type_keys(&[KeyId::Ctrl, KeyId::Char('c')]);

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.duration, 2.0);
    assert_eq!(outcome.events, vec![KeyId::Ctrl, KeyId::Char('c')]);
    assert!(outcome.warning.is_none());

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capture_without_permission_over_http() {
    let harness = Harness::start().await;
    harness.source.deny_access("/dev/input/event4");
    let url = harness.url();

    let (status, body) =
        blocking(move || raw("POST", &format!("{}/capture", url), Some(json!({})))).await;
    assert_eq!(status, 200);
    assert_eq!(body["events"], json!([]));
    assert_eq!(body["duration"], json!(1.0));
    assert!(!body["warning"].as_str().unwrap_or("").is_empty());

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn application_data_round_trip() {
    let harness = Harness::start().await;
    let client = harness.client();

    let (initial, stored) = blocking(move || {
        let initial = client.data().unwrap();
        client
            .save_data(&json!({"todos": [{"title": "ship", "done": false}]}))
            .unwrap();
        (initial, client.data().unwrap())
    })
    .await;

    assert_eq!(initial, json!([]));
    assert_eq!(stored["todos"][0]["title"], "ship");

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_route_replaces_data() {
    let harness = Harness::start().await;
    let url = harness.url();

    let (saved, stored) = blocking(move || {
        let saved = raw("POST", &format!("{}/save", url), Some(json!({"notes": 1})));
        (saved, raw("GET", &format!("{}/data", url), None))
    })
    .await;

    assert_eq!(saved.0, 200);
    assert_eq!(saved.1, json!({"status": "saved"}));
    assert_eq!(stored.1, json!({"notes": 1}));

    harness.shutdown().await;
}
