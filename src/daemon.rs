//! Daemon module - process wiring and lifecycle
//!
//! Builds the pattern store, capture and replay engines and the hotkey
//! dispatcher, re-binds stored hotkeys, serves the HTTP API and waits for
//! SIGINT/SIGTERM.

use crate::capture::CaptureEngine;
use crate::config::Config;
use crate::document::DocumentStore;
use crate::error::{Result, UniforgeError};
use crate::hotkey::HotkeyDispatcher;
use crate::input::{self, InputSource};
use crate::output::{self, KeyEmitter, UnavailableEmitter};
use crate::pattern::{JsonFileStorage, PatternStore};
use crate::replay::ReplayEngine;
use crate::service::{self, Services};
use pidlock::Pidlock;
use std::sync::Arc;

/// Wire the core components around a key source and emitter
pub fn assemble(
    config: &Config,
    source: Arc<dyn InputSource>,
    emitter: Arc<dyn KeyEmitter>,
) -> Services {
    let store = PatternStore::new(Box::new(JsonFileStorage::new(config.patterns_path())));
    let replay = ReplayEngine::new(emitter);

    Services::new(
        Arc::new(store),
        Arc::new(DocumentStore::new(config.document_path())),
        Arc::new(CaptureEngine::new(source)),
        replay.clone(),
        Arc::new(HotkeyDispatcher::new(replay)),
        config.default_capture_secs(),
    )
}

/// Platform emitter, or a stand-in that reports why replay cannot work
fn create_emitter() -> Arc<dyn KeyEmitter> {
    match output::create_emitter() {
        Ok(emitter) => {
            tracing::info!("Key output: {}", emitter.name());
            Arc::from(emitter)
        }
        Err(e) => {
            tracing::warn!("Key output unavailable, replay will fail: {}", e);
            Arc::new(UnavailableEmitter::new(e.to_string()))
        }
    }
}

/// Main daemon that owns the running components
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting uniforge daemon");

        let lock_dir = Config::runtime_dir();
        std::fs::create_dir_all(&lock_dir).map_err(|e| {
            UniforgeError::Config(format!("Failed to create {:?}: {}", lock_dir, e))
        })?;
        let lock_path = lock_dir.join("uniforge.lock");
        let mut pidlock = Pidlock::new(&lock_path.to_string_lossy());
        pidlock.acquire().map_err(|_| {
            UniforgeError::Config(format!(
                "Another uniforge daemon is already running (lock: {:?})",
                lock_path
            ))
        })?;

        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(|e| UniforgeError::Config(format!("Failed to set up SIGTERM handler: {}", e)))?;

        let source: Arc<dyn InputSource> = Arc::from(input::create_source());
        let services = assemble(&self.config, source.clone(), create_emitter());

        tracing::info!("Patterns: {:?}", self.config.patterns_path());
        let restored = services.hotkeys.restore(&services.store.list());
        if restored > 0 {
            tracing::info!("Restored {} hotkey binding(s)", restored);
        }

        let hotkey_task = if self.config.hotkeys.enabled {
            match services.hotkeys.start(source.as_ref()) {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!(
                        "Hotkeys disabled, patterns can still be replayed by name: {}",
                        e
                    );
                    None
                }
            }
        } else {
            tracing::info!("Built-in hotkeys disabled, use 'uniforge replay' instead");
            None
        };

        let handle = service::start(&self.config.service, services).await?;

        #[cfg(unix)]
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down...");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }

        #[cfg(not(unix))]
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to wait for Ctrl+C: {}", e);
        }

        handle.shutdown().await;
        if let Some(task) = hotkey_task {
            task.abort();
        }
        if let Err(e) = pidlock.release() {
            tracing::warn!("Failed to release daemon lock: {:?}", e);
        }

        tracing::info!("Daemon stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ChannelSource;
    use crate::key::KeyId;
    use crate::output::RecordingEmitter;

    #[test]
    fn test_assemble_uses_configured_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.capture.default_duration_secs = 0.2;

        let services = assemble(
            &config,
            Arc::new(ChannelSource::new()),
            Arc::new(RecordingEmitter::new()),
        );
        services
            .store
            .upsert("copy", vec![KeyId::Ctrl, KeyId::Char('c')], None)
            .unwrap();
        assert!(dir.path().join("patterns.json").exists());
        assert_eq!(services.documents.path(), dir.path().join("data.json"));
        assert_eq!(services.default_capture_secs, 1.0);
        assert_eq!(services.replay.emitter_name(), "recording");
    }
}
