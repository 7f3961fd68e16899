//! Image cycle: download every configured image, then run the burn-ban capture step.

use log::{debug, info};
use serde_json::json;
use std::process::Command;

use crate::client::{Fetch, FetchError};
use crate::diagnostics::{Channel, Diagnostic, DiagnosticsReporter};
use crate::output::{OutputSink, image_path};
use crate::services::cycle::{CycleOutcome, Failure, note_failure};
use crate::services::retry::{IMAGE_RETRY_STEP, RetryPolicy};
use crate::settings::{ImageSource, Settings};

pub const DEFAULT_IMAGE_EXTENSION: &str = "png";

/// External capture step run after the images when burn-ban capture is on.
pub trait ScriptedCapture {
    fn run(&self) -> Result<(), String>;
}

/// Runs a shell command; a non-zero exit is a failure.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    command: String,
}

impl CommandCapture {
    pub fn new(command: impl Into<String>) -> Self {
        CommandCapture { command: command.into() }
    }
}

impl ScriptedCapture for CommandCapture {
    fn run(&self) -> Result<(), String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .map_err(|e| format!("failed to start capture command: {}", e))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        if detail.is_empty() {
            Err(format!("capture command exited with {}", output.status))
        } else {
            Err(format!("capture command exited with {}: {}", output.status, detail))
        }
    }
}

/// File extension for a downloaded image: content type first, then the URL path, then png.
pub fn image_extension(content_type: Option<&str>, url: &str) -> String {
    let from_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .and_then(|ct| match ct.as_str() {
            "image/png" => Some("png"),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
            "image/gif" => Some("gif"),
            "image/webp" => Some("webp"),
            "image/bmp" => Some("bmp"),
            "image/svg+xml" => Some("svg"),
            "image/tiff" => Some("tiff"),
            _ => None,
        });
    if let Some(ext) = from_type {
        return ext.to_string();
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_IMAGE_EXTENSION.to_string(),
    }
}

/// Image names become file stems; path separators and reserved characters are replaced.
pub fn image_file_stem(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() { '-' } else { c })
        .collect()
}

pub struct ImagePoller<'a> {
    fetch: &'a dyn Fetch,
    output: &'a dyn OutputSink,
    diagnostics: &'a DiagnosticsReporter<'a>,
    capture: Option<&'a dyn ScriptedCapture>,
    retry: RetryPolicy,
}

impl<'a> ImagePoller<'a> {
    pub fn new(
        fetch: &'a dyn Fetch,
        output: &'a dyn OutputSink,
        diagnostics: &'a DiagnosticsReporter<'a>,
        capture: Option<&'a dyn ScriptedCapture>,
    ) -> Self {
        ImagePoller {
            fetch,
            output,
            diagnostics,
            capture,
            retry: RetryPolicy::linear(IMAGE_RETRY_STEP),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn run_cycle(&self, settings: &Settings) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        info!("Images: cycle starting for {} image(s)", settings.images.len());

        for image in &settings.images {
            match self.poll_image(image) {
                Ok(path) => {
                    outcome.record_success();
                    info!("Images: {}: saved {}", image.name, path);
                }
                Err(failure) => {
                    let payload = json!({"image": image.name, "url": image.url});
                    note_failure(self.diagnostics, &mut outcome, "Images", Channel::Images, &image.name, &failure, payload);
                }
            }
        }

        if settings.burn_ban_enabled {
            let result = match self.capture {
                Some(capture) => capture.run().map_err(Failure::Error),
                None => Err(Failure::Warning(
                    "burn ban capture is enabled but no capture command is configured".to_string(),
                )),
            };
            match result {
                Ok(()) => info!("Images: burn ban capture finished"),
                Err(failure) => {
                    note_failure(self.diagnostics, &mut outcome, "Images", Channel::Images, "BurnBanCapture", &failure, json!({}));
                }
            }
        }

        if outcome.is_clean() {
            let payload = json!({
                "images": settings.images.len(),
                "successCount": outcome.success_count,
                "warningCount": outcome.warning_count,
            });
            let _ = self.diagnostics.report(&Diagnostic::success("image_cycle", Channel::Images, payload));
        }
        info!(
            "Images: cycle done (success={}, errors={}, warnings={})",
            outcome.success_count, outcome.error_count, outcome.warning_count
        );
        outcome
    }

    fn poll_image(&self, image: &ImageSource) -> Result<String, Failure> {
        debug!("Images: GET {}", image.url);
        let what = format!("Images: {}", image.name);
        let response = self
            .retry
            .run(
                &what,
                |_| {
                    let response = self.fetch.get(&image.url)?.error_for_status()?;
                    if response.body.is_empty() {
                        return Err(FetchError::Transport("empty response body".to_string()));
                    }
                    Ok(response)
                },
                |_| false,
            )
            .map_err(|e| Failure::Error(format!("download failed: {}", e)))?;

        let ext = image_extension(response.content_type.as_deref(), &image.url);
        let path = image_path(&image_file_stem(&image.name), &ext);
        self.output
            .write(&path, &response.body)
            .map_err(|e| Failure::Error(format!("writing {} failed: {}", path.display(), e)))?;
        Ok(path.display().to_string())
    }
}
