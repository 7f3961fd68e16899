use log::{error, warn};
use serde_json::Value;
use std::fmt;

use crate::diagnostics::{Channel, Diagnostic, DiagnosticsReporter, Severity};

/// How a failed step counts toward the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Expected and not retried; logged and reported, never raises the banner.
    Warning(String),
    /// Counted, becomes the banner if it is the first one.
    Error(String),
}

impl Failure {
    pub fn message(&self) -> &str {
        match self {
            Failure::Warning(m) | Failure::Error(m) => m,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Failure::Warning(_) => Severity::Warning,
            Failure::Error(_) => Severity::Error,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Warning(m) => write!(f, "warning: {}", m),
            Failure::Error(m) => write!(f, "error: {}", m),
        }
    }
}

/// Per-cycle accounting, built fresh every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub success_count: u32,
    pub error_count: u32,
    pub warning_count: u32,
    pub first_error: Option<String>,
}

impl CycleOutcome {
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record(&mut self, failure: &Failure) {
        match failure {
            Failure::Warning(_) => self.warning_count += 1,
            Failure::Error(message) => {
                self.error_count += 1;
                self.first_error.get_or_insert_with(|| message.clone());
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}

/// Log a failure at the point of detection, count it, and report it.
pub fn note_failure(
    diagnostics: &DiagnosticsReporter<'_>,
    outcome: &mut CycleOutcome,
    stage: &str,
    channel: Channel,
    scope: &str,
    failure: &Failure,
    payload: Value,
) {
    match failure {
        Failure::Warning(m) => warn!("{}: {}: {}", stage, scope, m),
        Failure::Error(m) => error!("{}: {}: {}", stage, scope, m),
    }
    outcome.record(failure);
    let event = format!("{}_{}", stage.to_lowercase(), if matches!(failure, Failure::Warning(_)) { "warning" } else { "error" });
    let diagnostic = Diagnostic::problem(failure.severity(), &event, channel, scope, failure.message(), payload);
    let _ = diagnostics.report(&diagnostic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::tests::{RecordingPoster, map_for};
    use serde_json::json;

    #[test]
    fn first_error_sticks_and_warnings_do_not_count() {
        let mut outcome = CycleOutcome::default();
        outcome.record(&Failure::Warning("no coverage".into()));
        assert!(outcome.is_clean());
        outcome.record(&Failure::Error("first".into()));
        outcome.record(&Failure::Error("second".into()));
        outcome.record_success();
        assert_eq!(outcome.error_count, 2);
        assert_eq!(outcome.warning_count, 1);
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.first_error.as_deref(), Some("first"));
    }

    #[test]
    fn failures_are_reported_even_when_posting_fails() {
        let poster = RecordingPoster {
            fail: true,
            ..Default::default()
        };
        let reporter = DiagnosticsReporter::new(Some("a".into()), map_for("a"), &poster);
        let mut outcome = CycleOutcome::default();
        note_failure(
            &reporter,
            &mut outcome,
            "Weather",
            Channel::Data,
            "Peoria",
            &Failure::Error("http 500".into()),
            json!({"location": "Peoria"}),
        );
        assert_eq!(outcome.error_count, 1);
        let posts = poster.posts.borrow();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1["event"], "weather_error");
        assert_eq!(posts[0].1["type"], "error");
        assert_eq!(posts[0].1["error"]["scope"], "Peoria");
    }
}
