//! Process configuration from the environment.
//! Everything that changes at runtime (locations, images, cadences) lives in the settings file instead.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OUTPUT_DIR: &str = "./WeatherXMLFiles";
pub const DEFAULT_SETTINGS_FILE: &str = "./wxfeed-settings.json";
pub const DEFAULT_ICONS_DIR: &str = "./icons";
pub const DEFAULT_API_BASE: &str = "https://api.weather.gov";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of every written document.
    pub output_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Prefixed to derived icon paths in forecast documents.
    pub icons_dir: PathBuf,
    pub api_base: String,
    /// api.weather.gov rejects requests without an identifying User-Agent.
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Opaque logging id; diagnostics are off without it.
    pub diagnostics_id: Option<String>,
    pub webhook_map: Option<PathBuf>,
    /// Shell command for the burn-ban capture step.
    pub capture_command: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let non_empty = |key: &str| var(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let request_timeout_secs = match non_empty("WXFEED_REQUEST_TIMEOUT_SECS") {
            Some(s) => match s.parse::<u64>() {
                Ok(v) if v > 0 => v,
                _ => return Err("WXFEED_REQUEST_TIMEOUT_SECS must be a positive integer".to_string()),
            },
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let api_base = non_empty("WXFEED_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let user_agent = non_empty("WXFEED_USER_AGENT")
            .unwrap_or_else(|| format!("wxfeed/{} (contact unset)", env!("CARGO_PKG_VERSION")));

        Ok(Config {
            output_dir: PathBuf::from(non_empty("WXFEED_OUTPUT_DIR").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into())),
            settings_file: PathBuf::from(
                non_empty("WXFEED_SETTINGS_FILE").unwrap_or_else(|| DEFAULT_SETTINGS_FILE.into()),
            ),
            icons_dir: PathBuf::from(non_empty("WXFEED_ICONS_DIR").unwrap_or_else(|| DEFAULT_ICONS_DIR.into())),
            api_base,
            user_agent,
            request_timeout: Duration::from_secs(request_timeout_secs),
            diagnostics_id: non_empty("WXFEED_DIAGNOSTICS_ID"),
            webhook_map: non_empty("WXFEED_WEBHOOK_MAP").map(PathBuf::from),
            capture_command: non_empty("WXFEED_CAPTURE_COMMAND"),
        })
    }
}
