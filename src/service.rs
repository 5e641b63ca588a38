//! Local HTTP API for patterns, capture and replay.
//!
//! Runs in-process with the daemon and exposes:
//! - `GET /health`
//! - `POST /capture`
//! - `POST /replay`, `GET|POST /replay/name/:name`
//! - `GET|POST /patterns`, `DELETE /patterns/:name`
//! - `POST /hotkey/register`
//! - `GET|POST /data` (`POST /save` is kept as an alias)
//!
//! Handlers hold no state of their own; they translate JSON into calls on
//! the shared [`Services`] and map errors onto HTTP status codes.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::capture::{CaptureEngine, CaptureOutcome};
use crate::config::ServiceConfig;
use crate::document::DocumentStore;
use crate::error::{EmitError, UniforgeError};
use crate::hotkey::HotkeyDispatcher;
use crate::key::KeyId;
use crate::pattern::{normalize_hotkey, Pattern, PatternStore};
use crate::replay::{KeyFailure, ReplayEngine};

/// Core handles the API operates on
#[derive(Clone)]
pub struct Services {
    pub store: Arc<PatternStore>,
    pub documents: Arc<DocumentStore>,
    pub capture: Arc<CaptureEngine>,
    pub replay: ReplayEngine,
    pub hotkeys: Arc<HotkeyDispatcher>,
    /// Window used when a capture request gives none
    pub default_capture_secs: f64,
    /// Serializes edits that touch both the store and the bindings
    edits: Arc<Mutex<()>>,
}

impl Services {
    pub fn new(
        store: Arc<PatternStore>,
        documents: Arc<DocumentStore>,
        capture: Arc<CaptureEngine>,
        replay: ReplayEngine,
        hotkeys: Arc<HotkeyDispatcher>,
        default_capture_secs: f64,
    ) -> Self {
        Self {
            store,
            documents,
            capture,
            replay,
            hotkeys,
            default_capture_secs,
            edits: Arc::new(Mutex::new(())),
        }
    }

    fn lock_edits(&self) -> MutexGuard<'_, ()> {
        self.edits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert a pattern and bring its binding in line with it
    ///
    /// The stored hotkey is always one the dispatcher holds: a combination
    /// that cannot be bound is dropped from the saved pattern, and the
    /// previous binding of that name is removed.
    pub fn save_pattern(
        &self,
        name: &str,
        events: Vec<KeyId>,
        hotkey: Option<String>,
    ) -> Result<Vec<Pattern>, UniforgeError> {
        let _edits = self.lock_edits();

        let hotkey = normalize_hotkey(hotkey).filter(|hotkey| {
            let bindable = self.hotkeys.can_register(name, hotkey);
            if !bindable {
                tracing::warn!(
                    "Pattern '{}' saved without hotkey '{}': invalid or already in use",
                    name.trim(),
                    hotkey
                );
            }
            bindable
        });

        let patterns = self.store.upsert(name, events.clone(), hotkey.clone())?;
        match hotkey {
            Some(hotkey) => {
                self.hotkeys.register(name, &hotkey, events);
            }
            None => {
                self.hotkeys.unregister(name);
            }
        }
        Ok(patterns)
    }

    /// Delete a pattern and its binding
    pub fn delete_pattern(&self, name: &str) -> Result<Vec<Pattern>, UniforgeError> {
        let _edits = self.lock_edits();
        let patterns = self.store.delete(name)?;
        self.hotkeys.unregister(name);
        Ok(patterns)
    }

    /// Bind `hotkey` to an existing pattern, persisting it first
    ///
    /// Returns false when the combination is invalid or held by another
    /// pattern; nothing changes in that case.
    pub fn bind_pattern(&self, name: &str, hotkey: &str) -> Result<bool, UniforgeError> {
        let _edits = self.lock_edits();
        let pattern = self.store.find(name)?;
        if !self.hotkeys.can_register(&pattern.name, hotkey) {
            return Ok(false);
        }

        let hotkey = hotkey.trim();
        self.store
            .set_hotkey(&pattern.name, Some(hotkey.to_string()))?;
        Ok(self.hotkeys.register(&pattern.name, hotkey, pattern.events))
    }
}

#[derive(Debug, Default, Deserialize)]
struct CaptureRequest {
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ReplayRequest {
    #[serde(default, alias = "events")]
    pattern: Option<Vec<KeyId>>,
}

#[derive(Debug, Deserialize)]
struct SavePatternRequest {
    name: String,
    pattern: Vec<KeyId>,
    #[serde(default)]
    hotkey: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    hotkey: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReplayResponse {
    status: &'static str,
    failed: Vec<KeyFailure>,
}

#[derive(Serialize)]
struct RegisterResponse {
    registered: bool,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Serialize)]
struct ApiErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    error_type: &'static str,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            error_type: "invalid_request_error",
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            error_type: "server_error",
        }
    }
}

impl From<UniforgeError> for ApiError {
    fn from(err: UniforgeError) -> Self {
        let message = err.to_string();
        let (status, error_type) = match &err {
            UniforgeError::InvalidArgument(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            UniforgeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error"),
            UniforgeError::Busy => (StatusCode::CONFLICT, "busy_error"),
            UniforgeError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            UniforgeError::Emit(EmitError::Unavailable(_)) | UniforgeError::Input(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable_error")
            }
            _ => return ApiError::internal(message),
        };
        Self {
            status,
            message,
            error_type,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {}", self.message);
        } else {
            tracing::debug!("Request rejected: {}", self.message);
        }
        let body = ApiErrorResponse {
            error: ApiErrorBody {
                message: self.message,
                error_type: self.error_type.to_string(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Running local service handle.
pub struct ServiceHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ServiceHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Service task join error: {}", e);
        }
    }
}

/// Bind the listener and serve the API until shut down.
pub async fn start(
    service_cfg: &ServiceConfig,
    services: Services,
) -> Result<ServiceHandle, UniforgeError> {
    let bind_addr = format!("{}:{}", service_cfg.host, service_cfg.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| {
            UniforgeError::Config(format!(
                "Failed to bind service listener on {}: {}",
                bind_addr, e
            ))
        })?;
    let local_addr = listener.local_addr().map_err(|e| {
        UniforgeError::Config(format!("Failed to read service local address: {}", e))
    })?;

    let app = build_router(services, service_cfg.max_body_bytes);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        {
            tracing::error!("Service HTTP server failed: {}", e);
        }
    });

    tracing::info!("API listening on http://{}", local_addr);

    Ok(ServiceHandle {
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

fn build_router(services: Services, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/capture", post(capture_handler))
        .route("/replay", post(replay_handler))
        .route(
            "/replay/name/:name",
            get(replay_by_name_handler).post(replay_by_name_handler),
        )
        .route("/patterns", get(list_patterns).post(save_pattern))
        .route("/patterns/:name", delete(delete_pattern))
        .route("/hotkey/register", post(register_hotkey))
        .route("/data", get(get_data).post(save_data))
        .route("/save", post(save_data))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(services)
}

/// Decode a JSON body; an empty body reads as `T::default()` when allowed
fn parse_body<T: DeserializeOwned>(body: &Bytes, empty: Option<T>) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return empty.ok_or_else(|| ApiError::bad_request("Request body is required"));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

async fn health() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn capture_handler(
    State(services): State<Services>,
    body: Bytes,
) -> Result<Json<CaptureOutcome>, ApiError> {
    let request: CaptureRequest = parse_body(&body, Some(CaptureRequest::default()))?;
    let secs = request.duration.unwrap_or(services.default_capture_secs);
    let outcome = services.capture.capture(secs).await?;
    Ok(Json(outcome))
}

async fn replay_handler(
    State(services): State<Services>,
    body: Bytes,
) -> Result<Json<ReplayResponse>, ApiError> {
    let request: ReplayRequest = parse_body(&body, None)?;
    let events = request
        .pattern
        .ok_or_else(|| ApiError::bad_request("Missing required field: pattern"))?;
    replay_events(&services, events).await
}

async fn replay_by_name_handler(
    State(services): State<Services>,
    Path(name): Path<String>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let pattern = services.store.find(&name)?;
    replay_events(&services, pattern.events).await
}

async fn replay_events(
    services: &Services,
    events: Vec<KeyId>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let report = services.replay.replay_async(events).await?;
    Ok(Json(ReplayResponse {
        status: "replayed",
        failed: report.failed,
    }))
}

async fn list_patterns(State(services): State<Services>) -> Json<Vec<Pattern>> {
    Json(services.store.list())
}

async fn save_pattern(
    State(services): State<Services>,
    body: Bytes,
) -> Result<Json<Vec<Pattern>>, ApiError> {
    let request: SavePatternRequest = parse_body(&body, None)?;
    let patterns = services.save_pattern(&request.name, request.pattern, request.hotkey)?;
    Ok(Json(patterns))
}

async fn delete_pattern(
    State(services): State<Services>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Pattern>>, ApiError> {
    Ok(Json(services.delete_pattern(&name)?))
}

async fn register_hotkey(
    State(services): State<Services>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, ApiError> {
    let request: RegisterRequest = parse_body(&body, None)?;
    let registered = services.bind_pattern(&request.name, &request.hotkey)?;
    Ok(Json(RegisterResponse { registered }))
}

async fn get_data(State(services): State<Services>) -> Json<serde_json::Value> {
    Json(services.documents.load())
}

async fn save_data(
    State(services): State<Services>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let value: serde_json::Value = parse_body(&body, None)?;
    services
        .documents
        .save(&value)
        .map_err(UniforgeError::from)?;
    Ok(Json(StatusResponse { status: "saved" }))
}
