//! Wire types for the subset of the api.weather.gov GeoJSON responses we read.
//!
//! Every field is optional: the service omits or nulls fields freely, and the
//! transformer decides which absences are fatal.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuantitativeValue {
    pub value: Option<f64>,
    pub unit_code: Option<String>,
}

// Points

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PointResponse {
    pub properties: Option<PointProperties>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PointProperties {
    pub forecast: Option<String>,
    pub forecast_hourly: Option<String>,
    pub observation_stations: Option<String>,
}

// Forecasts (both the 12-hour and the hourly endpoint)

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ForecastResponse {
    pub properties: Option<ForecastProperties>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ForecastProperties {
    pub updated: Option<DateTime<FixedOffset>>,
    pub periods: Option<Vec<ForecastPeriod>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    pub number: Option<u32>,
    #[serde(default)]
    pub name: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub is_daytime: bool,
    pub temperature: Option<f64>,
    pub temperature_unit: Option<String>,
    pub wind_speed: Option<String>,
    pub wind_direction: Option<String>,
    pub icon: Option<String>,
    pub short_forecast: Option<String>,
    pub detailed_forecast: Option<String>,
    pub probability_of_precipitation: Option<QuantitativeValue>,
}

// Stations and observations

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StationCollection {
    pub features: Option<Vec<StationFeature>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StationFeature {
    pub properties: Option<StationProperties>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StationProperties {
    pub station_identifier: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ObservationResponse {
    pub properties: Option<Observation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub text_description: Option<String>,
    pub icon: Option<String>,
    pub temperature: Option<QuantitativeValue>,
    pub wind_direction: Option<QuantitativeValue>,
    pub wind_speed: Option<QuantitativeValue>,
}

// Alerts

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AlertCollection {
    pub features: Option<Vec<AlertFeature>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AlertFeature {
    pub properties: Option<AlertProperties>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlertProperties {
    pub id: Option<String>,
    pub area_desc: Option<String>,
    pub sent: Option<DateTime<FixedOffset>>,
    pub effective: Option<DateTime<FixedOffset>>,
    pub onset: Option<DateTime<FixedOffset>>,
    pub expires: Option<DateTime<FixedOffset>>,
    pub ends: Option<DateTime<FixedOffset>>,
    pub status: Option<String>,
    pub severity: Option<String>,
    pub certainty: Option<String>,
    pub urgency: Option<String>,
    pub event: Option<String>,
    pub sender_name: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    /// Free-form; most values are arrays of strings (`NWSheadline`, `tornadoDamageThreat`, ...).
    pub parameters: Option<BTreeMap<String, Value>>,
}

impl AlertProperties {
    pub fn first_parameter(&self, key: &str) -> Option<&str> {
        first_parameter(self.parameters.as_ref(), key)
    }
}

/// First string value of an alert parameter, whether it is sent as an array or a bare string.
pub fn first_parameter<'a>(parameters: Option<&'a BTreeMap<String, Value>>, key: &str) -> Option<&'a str> {
    match parameters?.get(key)? {
        Value::Array(items) => items.first().and_then(Value::as_str),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::decode_json;

    #[test]
    fn parses_forecast_fixture() {
        let json = std::fs::read("tests/data/forecast.json").expect("fixture present");
        let forecast: ForecastResponse = decode_json(&json).expect("parse forecast");
        let periods = forecast.properties.and_then(|p| p.periods).expect("periods");
        assert_eq!(periods.len(), 14);
        assert!(!periods[0].is_daytime);
        assert_eq!(
            periods[1].probability_of_precipitation.as_ref().and_then(|p| p.value),
            Some(40.0)
        );
    }

    #[test]
    fn reads_parameters_in_both_shapes() {
        let alert: AlertProperties = serde_json::from_str(
            r#"{"parameters":{"tornadoDamageThreat":["CATASTROPHIC"],"NWSheadline":"HEADLINE"}}"#,
        )
        .unwrap();
        assert_eq!(alert.first_parameter("tornadoDamageThreat"), Some("CATASTROPHIC"));
        assert_eq!(alert.first_parameter("NWSheadline"), Some("HEADLINE"));
        assert_eq!(alert.first_parameter("missing"), None);
    }
}
