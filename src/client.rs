//! Blocking HTTP access for the poller.
//!
//! - `ureq` agent with a per-request timeout; non-2xx responses are returned, not raised,
//!   so callers can tell a 404 from a 500.
//! - [`Fetch`] and [`WebhookPost`] are the seams the cycles depend on; [`HttpClient`]
//!   implements both against the network.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::utils::{DecodeError, decode_json};

/// Large radar loops are the biggest thing we download.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

const ACCEPT: &str = "application/geo+json, application/json;q=0.9, */*;q=0.8";

#[derive(Debug)]
pub enum FetchError {
    Transport(String),
    Http { status: u16, message: String },
    Decode(DecodeError),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl core::fmt::Display for FetchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FetchError::Transport(s) => write!(f, "transport error: {}", s),
            FetchError::Http { status, message } => write!(f, "http {}: {}", status, message),
            FetchError::Decode(e) => write!(f, "malformed payload {}", e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for FetchError {
    fn from(value: DecodeError) -> Self {
        FetchError::Decode(value)
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn status_text(&self) -> &'static str {
        http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
    }

    /// Turn a non-2xx response into an error, keep 2xx responses.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Http {
                status: self.status,
                message: self.status_text().to_string(),
            })
        }
    }
}

pub trait Fetch {
    fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

pub trait WebhookPost {
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), FetchError>;
}

/// GET `url` and decode a 2xx JSON body.
pub fn get_json<T: DeserializeOwned>(fetch: &dyn Fetch, url: &str) -> Result<T, FetchError> {
    let response = fetch.get(url)?.error_for_status()?;
    Ok(decode_json(&response.body)?)
}

pub struct HttpClient {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        HttpClient {
            agent: ureq::Agent::new_with_config(config),
            user_agent: user_agent.into(),
        }
    }

    fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<FetchResponse, FetchError> {
        let mut res = self
            .agent
            .post(url)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", "application/json")
            .send_json(body)
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = res.status().as_u16();
        let body = res
            .body_mut()
            .read_to_vec()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(FetchResponse {
            status,
            content_type: None,
            body,
        })
    }
}

impl Fetch for HttpClient {
    fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let mut res = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", ACCEPT)
            .call()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = res
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

impl WebhookPost for HttpClient {
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), FetchError> {
        self.post(url, body)?.error_for_status().map(|_| ())
    }
}
