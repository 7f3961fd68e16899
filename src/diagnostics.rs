//! Outbound diagnostics webhooks.
//!
//! The destination for each event type comes from a lookup table keyed by the
//! SHA-256 of an opaque logging id (or by the raw id). Reporting returns a `Result`
//! so failures are visible in tests; the poller always drops it.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::client::{FetchError, WebhookPost};
use crate::utils::{DecodeError, decode_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Data,
    Images,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Data => "data",
            Channel::Images => "images",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    DataSuccess,
    ImagesSuccess,
    Warning,
    Error,
}

impl EventType {
    pub fn classify(severity: Severity, channel: Channel) -> Self {
        match (severity, channel) {
            (Severity::Success, Channel::Data) => EventType::DataSuccess,
            (Severity::Success, Channel::Images) => EventType::ImagesSuccess,
            (Severity::Warning, _) => EventType::Warning,
            (Severity::Error, _) => EventType::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DataSuccess => "dataSuccess",
            EventType::ImagesSuccess => "imagesSuccess",
            EventType::Warning => "warning",
            EventType::Error => "error",
        }
    }
}

#[derive(Debug)]
pub enum DiagnosticsError {
    Io(std::io::Error),
    Map(DecodeError),
    Post(FetchError),
}

impl fmt::Display for DiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticsError::Io(e) => write!(f, "webhook map unreadable: {}", e),
            DiagnosticsError::Map(e) => write!(f, "webhook map invalid {}", e),
            DiagnosticsError::Post(e) => write!(f, "webhook post failed: {}", e),
        }
    }
}

impl std::error::Error for DiagnosticsError {}

/// Webhook URL templates per logging id.
#[derive(Debug, Clone, Default)]
pub struct WebhookMap {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl WebhookMap {
    pub fn load(path: &Path) -> Result<Self, DiagnosticsError> {
        let bytes = std::fs::read(path).map_err(DiagnosticsError::Io)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DiagnosticsError> {
        Ok(WebhookMap {
            entries: decode_json(bytes).map_err(DiagnosticsError::Map)?,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// URL for `event_type` ("dataSuccess", "imagesSuccess", "warning", "error"; the legacy
    /// "dataError"/"imagesError" count as "error"), with `{id}` filled in.
    pub fn resolve(&self, id: &str, event_type: &str) -> Option<String> {
        if id.is_empty() {
            return None;
        }
        let hash = hash_id(id);
        let Some(entry) = self.entries.get(&hash).or_else(|| self.entries.get(id)) else {
            warn!(
                "Diagnostics: no mapping entry for id={} hash={} mapSize={}",
                id,
                hash,
                self.entries.len()
            );
            return None;
        };

        let normalized = match event_type {
            "dataError" | "imagesError" => "error",
            other => other,
        };
        let single = [normalized];
        let candidates: &[&str] = match normalized {
            "error" => &["error", "dataError", "imagesError"],
            "warning" => &["warning", "error", "dataError", "imagesError"],
            _ => &single,
        };
        let template = candidates
            .iter()
            .filter_map(|k| entry.get(*k))
            .find(|t| !t.is_empty());
        let Some(template) = template else {
            warn!(
                "Diagnostics: no webhook URL mapped for type={} id={} availableTypes={}",
                normalized,
                id,
                entry.keys().cloned().collect::<Vec<_>>().join(",")
            );
            return None;
        };
        Some(template.replacen("{id}", id, 1))
    }
}

pub fn hash_id(id: &str) -> String {
    hex::encode(Sha256::digest(id.as_bytes()))
}

/// One reportable event.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub event: String,
    pub severity: Severity,
    pub channel: Channel,
    pub payload: Value,
    /// Error message for warnings and errors.
    pub message: Option<String>,
    /// Which stage or item the message is about.
    pub scope: Option<String>,
}

impl Diagnostic {
    pub fn success(event: &str, channel: Channel, payload: Value) -> Self {
        Diagnostic {
            event: event.to_string(),
            severity: Severity::Success,
            channel,
            payload,
            message: None,
            scope: None,
        }
    }

    pub fn problem(severity: Severity, event: &str, channel: Channel, scope: &str, message: &str, payload: Value) -> Self {
        Diagnostic {
            event: event.to_string(),
            severity,
            channel,
            payload,
            message: Some(message.to_string()),
            scope: Some(scope.to_string()),
        }
    }
}

pub fn build_envelope(id: &str, diagnostic: &Diagnostic, now: DateTime<Utc>) -> Value {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let event_type = EventType::classify(diagnostic.severity, diagnostic.channel);
    let mut envelope = json!({
        "event": diagnostic.event,
        "id": id,
        "timestamp": timestamp,
        "type": event_type.as_str(),
        "payload": diagnostic.payload,
    });
    if diagnostic.severity != Severity::Success {
        envelope["error"] = json!({
            "message": diagnostic.message.clone().unwrap_or_else(|| diagnostic.event.clone()),
            "scope": diagnostic.scope.clone().unwrap_or_else(|| diagnostic.channel.as_str().to_string()),
            "timestamp": timestamp,
        });
    }
    envelope
}

pub struct DiagnosticsReporter<'a> {
    id: Option<String>,
    webhooks: WebhookMap,
    poster: &'a dyn WebhookPost,
}

impl<'a> DiagnosticsReporter<'a> {
    pub fn new(id: Option<String>, webhooks: WebhookMap, poster: &'a dyn WebhookPost) -> Self {
        DiagnosticsReporter {
            id: id.filter(|s| !s.trim().is_empty()),
            webhooks,
            poster,
        }
    }

    /// Post `diagnostic` to its webhook. Without an id or a mapped URL this does nothing.
    pub fn report(&self, diagnostic: &Diagnostic) -> Result<(), DiagnosticsError> {
        let Some(id) = self.id.as_deref() else {
            return Ok(());
        };
        let event_type = EventType::classify(diagnostic.severity, diagnostic.channel);
        let Some(url) = self.webhooks.resolve(id, event_type.as_str()) else {
            return Ok(());
        };
        let envelope = build_envelope(id, diagnostic, Utc::now());
        debug!("Diagnostics: posting {} ({})", diagnostic.event, event_type.as_str());
        self.poster.post_json(&url, &envelope).map_err(DiagnosticsError::Post)
    }
}
