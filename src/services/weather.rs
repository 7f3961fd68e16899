//! One weather cycle: forecasts per location, then alerts per location, then graphic names.
//!
//! Locations are handled strictly one after another. Every document for a location is
//! built before the first write and the set is written as one batch, so a failed fetch,
//! transform or write leaves the previous files exactly as they were.

use chrono::{DateTime, Local, Utc};
use log::{debug, info};
use serde_json::json;
use std::path::PathBuf;

use crate::alerts::{build_alert_records, render_alert};
use crate::client::{Fetch, FetchError, get_json};
use crate::diagnostics::{Channel, Diagnostic, DiagnosticsReporter};
use crate::forecast::transform;
use crate::models::nws::{AlertCollection, ForecastResponse, Observation, ObservationResponse, PointResponse, StationCollection};
use crate::output::{OutputSink, alert_path, forecast_path};
use crate::services::cycle::{CycleOutcome, Failure, note_failure};
use crate::services::graphics::{graphics_path, render_graphics};
use crate::services::retry::{RetryPolicy, WEATHER_RETRY_STEP};
use crate::settings::{Location, Settings};
use crate::xml::sanitize;

pub struct WeatherPoller<'a> {
    fetch: &'a dyn Fetch,
    output: &'a dyn OutputSink,
    diagnostics: &'a DiagnosticsReporter<'a>,
    api_base: String,
    icons_dir: PathBuf,
    retry: RetryPolicy,
}

/// Upstream URLs for one location, from the points lookup.
struct Endpoints {
    hourly: String,
    daily: String,
    stations: Option<String>,
}

/// NWS wants at most four decimals.
fn coordinate(value: f64) -> String {
    let s = format!("{:.4}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

fn is_client_error(e: &FetchError) -> bool {
    matches!(e.status(), Some(s) if (400..500).contains(&s))
}

impl<'a> WeatherPoller<'a> {
    pub fn new(
        fetch: &'a dyn Fetch,
        output: &'a dyn OutputSink,
        diagnostics: &'a DiagnosticsReporter<'a>,
        api_base: &str,
        icons_dir: impl Into<PathBuf>,
    ) -> Self {
        WeatherPoller {
            fetch,
            output,
            diagnostics,
            api_base: api_base.trim_end_matches('/').to_string(),
            icons_dir: icons_dir.into(),
            retry: RetryPolicy::linear(WEATHER_RETRY_STEP),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn run_cycle(&self, settings: &Settings, now: DateTime<Utc>) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        info!("Weather: cycle starting for {} location(s)", settings.locations.len());

        for location in &settings.locations {
            match self.poll_forecasts(location, now, &mut outcome) {
                Ok(written) => {
                    outcome.record_success();
                    info!("Weather: {}: wrote {} forecast document(s)", location.name, written);
                }
                Err(failure) => self.fail(&mut outcome, "Weather", location, &failure),
            }
        }

        for location in &settings.locations {
            if let Err(failure) = self.poll_alerts(location) {
                self.fail(&mut outcome, "Alerts", location, &failure);
            }
        }

        if !settings.graphic_templates.is_empty() {
            let local = now.with_timezone(&Local).fixed_offset();
            let rendered = render_graphics(&settings.graphic_templates, &local);
            if !rendered.unknown.is_empty() {
                let failure = Failure::Warning(format!("unknown placeholder(s): {}", rendered.unknown.join(", ")));
                note_failure(self.diagnostics, &mut outcome, "Graphics", Channel::Data, "GraphicNames", &failure, json!({}));
            }
            if let Err(e) = self.output.write(graphics_path(), rendered.content.as_bytes()) {
                let failure = Failure::Error(format!("writing graphic names failed: {}", e));
                note_failure(self.diagnostics, &mut outcome, "Graphics", Channel::Data, "GraphicNames", &failure, json!({}));
            }
        }

        if outcome.is_clean() {
            let payload = json!({
                "locations": settings.locations.len(),
                "successCount": outcome.success_count,
                "warningCount": outcome.warning_count,
            });
            let _ = self.diagnostics.report(&Diagnostic::success("weather_cycle", Channel::Data, payload));
        }
        info!(
            "Weather: cycle done (success={}, errors={}, warnings={})",
            outcome.success_count, outcome.error_count, outcome.warning_count
        );
        outcome
    }

    fn fail(&self, outcome: &mut CycleOutcome, stage: &str, location: &Location, failure: &Failure) {
        let payload = json!({
            "location": location.name,
            "latitude": location.latitude,
            "longitude": location.longitude,
        });
        note_failure(self.diagnostics, outcome, stage, Channel::Data, &location.name, failure, payload);
    }

    fn get<T: serde::de::DeserializeOwned>(&self, what: &str, url: &str) -> Result<T, FetchError> {
        debug!("Weather: GET {}", url);
        self.retry.run(what, |_| get_json(self.fetch, url), |_| false)
    }

    fn resolve_endpoints(&self, location: &Location) -> Result<Endpoints, Failure> {
        let url = format!(
            "{}/points/{},{}",
            self.api_base,
            coordinate(location.latitude),
            coordinate(location.longitude)
        );
        let what = format!("Weather: {} points lookup", location.name);
        let point: PointResponse = self
            .retry
            .run(&what, |_| get_json(self.fetch, &url), |e| e.status() == Some(404))
            .map_err(|e| match e.status() {
                Some(404) => Failure::Warning(format!("no forecast coverage at {},{} (404)", location.latitude, location.longitude)),
                _ => Failure::Error(format!("points lookup failed: {}", e)),
            })?;

        let props = point.properties.unwrap_or_default();
        match (props.forecast_hourly, props.forecast) {
            (Some(hourly), Some(daily)) => Ok(Endpoints {
                hourly,
                daily,
                stations: props.observation_stations,
            }),
            _ => Err(Failure::Error("points response has no forecast URLs".to_string())),
        }
    }

    /// Latest observation from the first listed station.
    fn latest_observation(&self, location: &Location, stations_url: Option<&str>) -> Result<Observation, Failure> {
        let stations_url = stations_url.ok_or_else(|| Failure::Warning("no observation stations listed".to_string()))?;
        let stations: StationCollection = self
            .get(&format!("Weather: {} stations", location.name), stations_url)
            .map_err(|e| Failure::Warning(format!("station list unavailable: {}", e)))?;
        let station = stations
            .features
            .unwrap_or_default()
            .into_iter()
            .find_map(|f| f.properties.and_then(|p| p.station_identifier))
            .ok_or_else(|| Failure::Warning("station list is empty".to_string()))?;
        let url = format!("{}/stations/{}/observations/latest", self.api_base, station);
        let observation: ObservationResponse = self
            .get(&format!("Weather: {} observation", location.name), &url)
            .map_err(|e| Failure::Warning(format!("latest observation from {} unavailable: {}", station, e)))?;
        observation
            .properties
            .ok_or_else(|| Failure::Warning(format!("latest observation from {} is empty", station)))
    }

    /// Current conditions are optional: without an observation the other documents are still written.
    fn poll_forecasts(&self, location: &Location, now: DateTime<Utc>, outcome: &mut CycleOutcome) -> Result<usize, Failure> {
        let endpoints = self.resolve_endpoints(location)?;
        let hourly: ForecastResponse = self
            .get(&format!("Weather: {} hourly forecast", location.name), &endpoints.hourly)
            .map_err(|e| Failure::Error(format!("hourly forecast failed: {}", e)))?;
        let daily: ForecastResponse = self
            .get(&format!("Weather: {} forecast", location.name), &endpoints.daily)
            .map_err(|e| Failure::Error(format!("forecast failed: {}", e)))?;

        let observation = match self.latest_observation(location, endpoints.stations.as_deref()) {
            Ok(o) => Some(o),
            Err(failure) => {
                self.fail(outcome, "Weather", location, &failure);
                None
            }
        };

        let forecasts = transform(&hourly, &daily, observation.as_ref(), &self.icons_dir, now)
            .map_err(|e| Failure::Error(e.to_string()))?;
        let documents = forecasts.documents();

        let stem = sanitize(&location.name);
        let files: Vec<_> = documents
            .iter()
            .map(|doc| (forecast_path(&stem, doc.kind, doc.variant), doc.content.as_bytes()))
            .collect();
        self.output
            .write_all(&files)
            .map_err(|e| Failure::Error(format!("writing forecasts for {} failed: {}", location.name, e)))?;
        Ok(documents.len())
    }

    fn poll_alerts(&self, location: &Location) -> Result<(), Failure> {
        let url = format!(
            "{}/alerts/active?point={},{}",
            self.api_base,
            coordinate(location.latitude),
            coordinate(location.longitude)
        );
        let what = format!("Alerts: {}", location.name);
        let collection: AlertCollection = self
            .retry
            .run(&what, |_| get_json(self.fetch, &url), is_client_error)
            .map_err(|e| {
                if is_client_error(&e) {
                    Failure::Warning(format!("alerts unavailable: {}", e))
                } else {
                    Failure::Error(format!("alerts fetch failed: {}", e))
                }
            })?;

        let missing_list = collection.features.is_none();
        let alerts: Vec<_> = collection
            .features
            .unwrap_or_default()
            .into_iter()
            .filter_map(|f| f.properties)
            .collect();

        let stem = sanitize(&location.name);
        let rendered: Vec<_> = build_alert_records(&alerts)
            .into_iter()
            .map(|(key, record)| (alert_path(&stem, key.as_str()), render_alert(&record)))
            .collect();
        let files: Vec<_> = rendered.iter().map(|(path, doc)| (path.clone(), doc.as_bytes())).collect();
        self.output
            .write_all(&files)
            .map_err(|e| Failure::Error(format!("writing alerts for {} failed: {}", location.name, e)))?;
        debug!("Alerts: {}: {} raw alert(s)", location.name, alerts.len());

        if missing_list {
            return Err(Failure::Warning("alert response has no features list; wrote placeholders".to_string()));
        }
        Ok(())
    }
}
