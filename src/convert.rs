//! Unit conversions used by the forecast views.
//!
//! Everything here is pure and total: malformed input is passed through or mapped
//! to a neutral value instead of raising an error.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::utils::format_number;

/// Shown instead of a precipitation chance that is missing or too small to mention.
/// Zero-width space, so templates still find a non-empty field.
pub const PRECIP_PLACEHOLDER: &str = "\u{200B}";

/// Chances below this percentage are not displayed.
pub const PRECIP_DISPLAY_MIN: f64 = 15.0;

static FIRST_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?(\d+(\.\d*)?|\.\d+)").expect("valid regex"));

/// Result of [`celsius_string_to_fahrenheit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Temperature {
    /// Input was a Celsius string and has been converted.
    Fahrenheit(f64),
    /// Input was left alone.
    Unchanged(String),
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temperature::Fahrenheit(v) => write!(f, "{}", format_number(*v)),
            Temperature::Unchanged(s) => write!(f, "{}", s),
        }
    }
}

/// Convert a string such as `"21C"` to Fahrenheit.
///
/// Anything that does not end in `C` after trimming, or has no leading number,
/// comes back unchanged.
pub fn celsius_string_to_fahrenheit(value: &str) -> Temperature {
    let trimmed = value.trim();
    let Some(body) = trimmed.strip_suffix('C') else {
        return Temperature::Unchanged(value.to_string());
    };
    let parsed = LEADING_NUMBER
        .find(body.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok());
    match parsed {
        Some(c) => Temperature::Fahrenheit(celsius_to_fahrenheit(c)),
        None => Temperature::Unchanged(value.to_string()),
    }
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    (c * 9.0 / 5.0) + 32.0
}

// Half-open [from, to) bands. ENE stops at 75 while E starts at 78.75; the hole
// between them maps to "" and downstream templates already rely on that.
const COMPASS_BANDS: [(f64, f64, &str); 16] = [
    (11.25, 33.75, "NNE"),
    (33.75, 56.25, "NE"),
    (56.25, 75.0, "ENE"),
    (78.75, 101.25, "E"),
    (101.25, 123.75, "ESE"),
    (123.75, 146.25, "SE"),
    (146.25, 168.75, "SSE"),
    (168.75, 191.25, "S"),
    (191.25, 213.75, "SSW"),
    (213.75, 236.25, "SW"),
    (236.25, 258.75, "WSW"),
    (258.75, 281.25, "W"),
    (281.25, 303.75, "WNW"),
    (303.75, 326.25, "NW"),
    (326.25, 348.75, "NNW"),
    (348.75, 360.0, "N"),
];

/// 16-point compass name for a direction in degrees.
pub fn wind_degrees_to_compass(deg: f64) -> &'static str {
    if !deg.is_finite() {
        return "";
    }
    let deg = deg.rem_euclid(360.0);
    if deg < 11.25 {
        return "N";
    }
    COMPASS_BANDS
        .iter()
        .find(|(from, to, _)| deg >= *from && deg < *to)
        .map(|(_, _, name)| *name)
        .unwrap_or("")
}

/// First integer embedded in a wind speed string ("10 to 15 mph" -> 10), or 0.
pub fn extract_wind_speed_number(text: &str) -> u32 {
    FIRST_INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn format_precipitation_display(value: Option<f64>) -> String {
    match value {
        Some(v) if v >= PRECIP_DISPLAY_MIN => format!("{}%", format_number(v)),
        _ => PRECIP_PLACEHOLDER.to_string(),
    }
}

/// Convert a wind speed reported with a WMO unit code to miles per hour.
/// Unknown units are assumed to be km/h, which is what observations use.
pub fn wind_speed_to_mph(value: f64, unit_code: Option<&str>) -> f64 {
    match unit_code {
        Some(u) if u.ends_with("m_s-1") && !u.ends_with("km_s-1") => value * 2.236_936,
        Some(u) if u.ends_with("mi_h-1") => value,
        Some(u) if u.ends_with("kn") || u.ends_with("kt") => value * 1.150_779,
        _ => value * 0.621_371,
    }
}
