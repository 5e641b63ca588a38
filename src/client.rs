//! Blocking HTTP client for a running daemon
//!
//! CLI subcommands other than `daemon` talk to the daemon's API instead of
//! touching the input devices themselves, so only one process ever holds
//! the keyboard hook.

use crate::capture::CaptureOutcome;
use crate::config::Config;
use crate::error::UniforgeError;
use crate::key::KeyId;
use crate::pattern::Pattern;
use crate::replay::KeyFailure;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Longest capture window plus headroom
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a replay request
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayStatus {
    pub status: String,
    #[serde(default)]
    pub failed: Vec<KeyFailure>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct Registered {
    registered: bool,
}

/// Client for the daemon's HTTP API
pub struct DaemonClient {
    base_url: String,
    agent: ureq::Agent,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.service_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health(&self) -> Result<(), UniforgeError> {
        let _: Value = self.call(self.agent.get(&self.url("/health")), None)?;
        Ok(())
    }

    pub fn capture(&self, duration: Option<f64>) -> Result<CaptureOutcome, UniforgeError> {
        let body = match duration {
            Some(d) => json!({ "duration": d }),
            None => json!({}),
        };
        self.call(self.agent.post(&self.url("/capture")), Some(body))
    }

    pub fn replay_keys(&self, keys: &[KeyId]) -> Result<ReplayStatus, UniforgeError> {
        self.call(
            self.agent.post(&self.url("/replay")),
            Some(json!({ "pattern": keys })),
        )
    }

    pub fn replay_name(&self, name: &str) -> Result<ReplayStatus, UniforgeError> {
        let path = format!("/replay/name/{}", encode_segment(name));
        self.call(self.agent.post(&self.url(&path)), Some(json!({})))
    }

    pub fn patterns(&self) -> Result<Vec<Pattern>, UniforgeError> {
        self.call(self.agent.get(&self.url("/patterns")), None)
    }

    pub fn save_pattern(
        &self,
        name: &str,
        events: &[KeyId],
        hotkey: Option<&str>,
    ) -> Result<Vec<Pattern>, UniforgeError> {
        self.call(
            self.agent.post(&self.url("/patterns")),
            Some(json!({
                "name": name,
                "pattern": events,
                "hotkey": hotkey.unwrap_or(""),
            })),
        )
    }

    pub fn delete_pattern(&self, name: &str) -> Result<Vec<Pattern>, UniforgeError> {
        let path = format!("/patterns/{}", encode_segment(name));
        self.call(self.agent.delete(&self.url(&path)), None)
    }

    pub fn register_hotkey(&self, name: &str, hotkey: &str) -> Result<bool, UniforgeError> {
        let response: Registered = self.call(
            self.agent.post(&self.url("/hotkey/register")),
            Some(json!({ "name": name, "hotkey": hotkey })),
        )?;
        Ok(response.registered)
    }

    pub fn data(&self) -> Result<Value, UniforgeError> {
        self.call(self.agent.get(&self.url("/data")), None)
    }

    pub fn save_data(&self, value: &Value) -> Result<(), UniforgeError> {
        let _: Value = self.call(self.agent.post(&self.url("/data")), Some(value.clone()))?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn call<T: DeserializeOwned>(
        &self,
        request: ureq::Request,
        body: Option<Value>,
    ) -> Result<T, UniforgeError> {
        tracing::debug!("{} {}", request.method(), request.url());
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        let response = result.map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                let message = serde_json::from_str::<ErrorEnvelope>(&body)
                    .map(|env| env.error.message)
                    .unwrap_or(body);
                if code == 409 {
                    UniforgeError::Busy
                } else {
                    UniforgeError::Daemon(format!("HTTP {}: {}", code, message))
                }
            }
            ureq::Error::Transport(t) => UniforgeError::Daemon(format!(
                "Cannot reach the daemon at {}: {}. Is 'uniforge daemon' running?",
                self.base_url, t
            )),
        })?;

        response
            .into_json()
            .map_err(|e| UniforgeError::Daemon(format!("Invalid response from daemon: {}", e)))
    }
}

/// Percent-encode one URL path segment
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
