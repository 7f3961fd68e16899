//! Forecast transformer: raw forecast periods and the latest observation in,
//! labeled display views out.
//!
//! Each view is produced twice, keyed by absolute (calendar) labels and by relative
//! labels, with identical records in both. Missing period arrays are an error so a
//! broken upstream response never replaces good files with empty ones.

use chrono::{DateTime, Utc};
use std::fmt;
use std::error::Error;
use std::path::Path;

use crate::convert::{
    Temperature, celsius_string_to_fahrenheit, celsius_to_fahrenheit, extract_wind_speed_number,
    format_precipitation_display, wind_degrees_to_compass, wind_speed_to_mph,
};
use crate::labels::{
    DayNightCounter, absolute_daily_label, absolute_day_night_label, absolute_hourly_label,
    relative_hourly_label,
};
use crate::models::nws::{ForecastPeriod, ForecastResponse, Observation};
use crate::utils::format_number;
use crate::xml::{Record, View, render_view};

/// Extension of the locally installed icon set.
pub const ICON_EXTENSION: &str = ".png";

/// Key under which current conditions are added to both daily views.
pub const CURRENT_CONDITIONS_KEY: &str = "CurrentConditions";

/// Shown instead of a wind speed when the observation reports none.
pub const CALM: &str = "Calm";

#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The named forecast payload has no (or an empty) `properties.periods` array.
    MissingPeriods(&'static str),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::MissingPeriods(kind) => write!(f, "{} forecast has no periods", kind),
        }
    }
}

impl Error for TransformError {}

/// The same records under absolute and relative keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewPair {
    pub absolute: View,
    pub relative: View,
}

impl ViewPair {
    fn insert(&mut self, absolute: &str, relative: &str, record: Record) {
        self.absolute.insert(absolute, record.clone());
        self.relative.insert(relative, record);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecasts {
    pub hourly: ViewPair,
    pub day_night: ViewPair,
    pub daily: ViewPair,
    pub current: Option<Record>,
}

/// One output file, named `{location}-{kind}[-{variant}].xml` by the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDocument {
    pub kind: &'static str,
    pub variant: Option<&'static str>,
    pub content: String,
}

impl Forecasts {
    pub fn documents(&self) -> Vec<ForecastDocument> {
        let doc = |kind, variant, view: &View| ForecastDocument {
            kind,
            variant,
            content: render_view(kind, view),
        };

        let mut hourly = self.hourly.absolute.clone();
        hourly.extend(&self.hourly.relative);

        let mut docs = vec![
            doc("HourlyForecast", None, &hourly),
            doc("DayAndNightForecast", None, &self.day_night.absolute),
            doc("DayAndNightForecast", Some("Relative"), &self.day_night.relative),
            doc("DailyForecast", None, &self.daily.absolute),
            doc("DailyForecast", Some("Relative"), &self.daily.relative),
        ];
        if let Some(current) = &self.current {
            let mut view = View::new();
            view.insert("Current", current.clone());
            docs.push(doc("CurrentConditions", None, &view));
        }
        docs
    }
}

fn periods<'a>(response: &'a ForecastResponse, kind: &'static str) -> Result<&'a [ForecastPeriod], TransformError> {
    match response.properties.as_ref().and_then(|p| p.periods.as_deref()) {
        Some(periods) if !periods.is_empty() => Ok(periods),
        _ => Err(TransformError::MissingPeriods(kind)),
    }
}

/// Build every view for one location.
pub fn transform(
    hourly: &ForecastResponse,
    daily: &ForecastResponse,
    observation: Option<&Observation>,
    icons_dir: &Path,
    now: DateTime<Utc>,
) -> Result<Forecasts, TransformError> {
    let hourly_periods = periods(hourly, "hourly")?;
    let daily_periods = periods(daily, "daily")?;

    let current = observation.map(|o| format_current_conditions(o, icons_dir));
    let mut daily_views = format_daily_forecast(daily_periods, icons_dir);
    if let Some(current) = &current {
        daily_views.insert(CURRENT_CONDITIONS_KEY, CURRENT_CONDITIONS_KEY, current.clone());
    }

    Ok(Forecasts {
        hourly: format_hourly_forecast(hourly_periods, icons_dir, now),
        day_night: format_day_night_forecast(daily_periods, icons_dir),
        daily: daily_views,
        current,
    })
}

/// Temperature and unit for display; Celsius periods are converted to Fahrenheit.
fn period_temperature(period: &ForecastPeriod) -> (String, String) {
    let unit = period.temperature_unit.as_deref().unwrap_or("F");
    let Some(value) = period.temperature else {
        return (String::new(), unit.to_string());
    };
    match celsius_string_to_fahrenheit(&format!("{}{}", format_number(value), unit)) {
        Temperature::Fahrenheit(f) => (format_number(f), "F".to_string()),
        Temperature::Unchanged(_) => (format_number(value), unit.to_string()),
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn period_icon(period: &ForecastPeriod, icons_dir: &Path) -> String {
    period
        .icon
        .as_deref()
        .map(|url| icon_path(url, icons_dir))
        .unwrap_or_default()
}

fn precipitation(period: &ForecastPeriod) -> Option<f64> {
    period.probability_of_precipitation.as_ref().and_then(|p| p.value)
}

pub fn format_hourly_forecast(periods: &[ForecastPeriod], icons_dir: &Path, now: DateTime<Utc>) -> ViewPair {
    let mut views = ViewPair::default();
    for period in periods {
        let (temperature, unit) = period_temperature(period);
        let record = Record::new()
            .field("DisplayName", period.start_time.format("%-I %p").to_string())
            .field("Weekday", period.start_time.format("%a").to_string())
            .field("Temperature", temperature)
            .field("Unit", unit)
            .field("WindSpeed", text(&period.wind_speed))
            .field("WindDirection", text(&period.wind_direction))
            .field("Condition", text(&period.short_forecast))
            .field("IconPath", period_icon(period, icons_dir));
        views.insert(
            &absolute_hourly_label(&period.start_time),
            &relative_hourly_label(&period.start_time, now),
            record,
        );
    }
    views
}

pub fn format_day_night_forecast(periods: &[ForecastPeriod], icons_dir: &Path) -> ViewPair {
    let mut views = ViewPair::default();
    let mut counter = DayNightCounter::new();
    for period in periods {
        let Some(relative) = counter.next(period.is_daytime) else {
            continue;
        };
        let (temperature, unit) = period_temperature(period);
        let record = Record::new()
            .field("Name", period.name.clone())
            .field("Weekday", period.start_time.format("%a").to_string())
            .field("Temperature", temperature)
            .field("Unit", unit)
            .field("WindSpeed", text(&period.wind_speed))
            .field("WindDirection", text(&period.wind_direction))
            .field("Precipitation", format_precipitation_display(precipitation(period)))
            .field("Condition", text(&period.short_forecast))
            .field("DetailedForecast", text(&period.detailed_forecast))
            .field("IconPath", period_icon(period, icons_dir));
        views.insert(&absolute_day_night_label(&period.start_time), &relative, record);
    }
    views
}

/// Merge day+night pairs into one record per day, starting at the first daytime period.
pub fn format_daily_forecast(periods: &[ForecastPeriod], icons_dir: &Path) -> ViewPair {
    let mut views = ViewPair::default();
    let Some(first_day) = periods.iter().position(|p| p.is_daytime) else {
        return views;
    };

    let mut day_number = 0;
    let mut i = first_day;
    while i + 1 < periods.len() {
        let (day, night) = (&periods[i], &periods[i + 1]);
        if !day.is_daytime || night.is_daytime {
            i += 1;
            continue;
        }
        day_number += 1;
        views.insert(
            &absolute_daily_label(&day.start_time),
            &format!("Day{}", day_number),
            merge_day_and_night(day, night, icons_dir),
        );
        i += 2;
    }
    views
}

fn merge_day_and_night(day: &ForecastPeriod, night: &ForecastPeriod, icons_dir: &Path) -> Record {
    let (high, unit) = period_temperature(day);
    let (low, _) = period_temperature(night);

    let day_speed = extract_wind_speed_number(day.wind_speed.as_deref().unwrap_or(""));
    let night_speed = extract_wind_speed_number(night.wind_speed.as_deref().unwrap_or(""));
    let (speed, direction) = if night_speed > day_speed {
        (night_speed, &night.wind_direction)
    } else {
        (day_speed, &day.wind_direction)
    };

    let chance = match (precipitation(day), precipitation(night)) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    Record::new()
        .field("Name", day.name.clone())
        .field("Weekday", day.start_time.format("%a").to_string())
        .field("High", high)
        .field("Low", low)
        .field("Unit", unit)
        .field("WindSpeed", format!("{} mph", speed))
        .field("WindDirection", text(direction))
        .field("Precipitation", format_precipitation_display(chance))
        .field("DayCondition", text(&day.short_forecast))
        .field("NightCondition", text(&night.short_forecast))
        .field("DayDetailedForecast", text(&day.detailed_forecast))
        .field("NightDetailedForecast", text(&night.detailed_forecast))
        .field("DayIconPath", period_icon(day, icons_dir))
        .field("NightIconPath", period_icon(night, icons_dir))
}

pub fn format_current_conditions(observation: &Observation, icons_dir: &Path) -> Record {
    let temperature = observation
        .temperature
        .as_ref()
        .and_then(|t| t.value)
        .map(|c| format_number(celsius_to_fahrenheit(c).round()))
        .unwrap_or_default();

    let wind_mph = observation
        .wind_speed
        .as_ref()
        .and_then(|w| w.value.map(|v| wind_speed_to_mph(v, w.unit_code.as_deref()).round()));
    let wind_speed = match wind_mph {
        Some(mph) if mph > 0.0 => format!("{} mph", format_number(mph)),
        _ => CALM.to_string(),
    };

    let wind_direction = observation
        .wind_direction
        .as_ref()
        .and_then(|d| d.value)
        .map(wind_degrees_to_compass)
        .unwrap_or_default();

    Record::new()
        .field("Temperature", temperature)
        .field("Unit", "F")
        .field("WindSpeed", wind_speed)
        .field("WindDirection", wind_direction)
        .field("Condition", text(&observation.text_description))
        .field(
            "IconPath",
            observation
                .icon
                .as_deref()
                .map(|url| icon_path(url, icons_dir))
                .unwrap_or_default(),
        )
}

/// Local icon file for an upstream icon URL.
///
/// `https://api.weather.gov/icons/land/night/tsra_hi,40?size=medium` becomes
/// `{icons_dir}/night/tsra_hi.png`.
pub fn icon_path(url: &str, icons_dir: &Path) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    let mut name: String = file.chars().filter(|c| !c.is_ascii_digit() && *c != ',').collect();
    if name.is_empty() {
        return String::new();
    }
    if !name.ends_with(ICON_EXTENSION) {
        name.push_str(ICON_EXTENSION);
    }
    let relative = if path.contains("/night/") {
        format!("night/{}", name)
    } else {
        name
    };
    icons_dir.join(relative).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::nws::ObservationResponse;
    use crate::utils::decode_json;
    use chrono::{DateTime, FixedOffset};

    const ICONS: &str = "/icons";

    fn fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
        let bytes = std::fs::read(format!("tests/data/{}", name)).expect("fixture present");
        decode_json(&bytes).expect("fixture parses")
    }

    fn period(start: &str, is_daytime: bool) -> ForecastPeriod {
        ForecastPeriod {
            number: None,
            name: if is_daytime { "Today".into() } else { "Tonight".into() },
            start_time: DateTime::<FixedOffset>::parse_from_rfc3339(start).unwrap(),
            end_time: None,
            is_daytime,
            temperature: Some(70.0),
            temperature_unit: Some("F".into()),
            wind_speed: Some("5 mph".into()),
            wind_direction: Some("S".into()),
            icon: None,
            short_forecast: Some("Sunny".into()),
            detailed_forecast: Some("Sunny all day.".into()),
            probability_of_precipitation: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-05T14:30:00-06:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn icon_paths() {
        let dir = Path::new(ICONS);
        assert_eq!(
            icon_path("https://api.weather.gov/icons/land/night/tsra_hi,40?size=medium", dir),
            "/icons/night/tsra_hi.png"
        );
        assert_eq!(
            icon_path("https://api.weather.gov/icons/land/day/few?size=medium", dir),
            "/icons/few.png"
        );
        assert_eq!(
            icon_path("https://api.weather.gov/icons/land/day/rain_showers,30/rain_showers,60", dir),
            "/icons/rain_showers.png"
        );
        assert_eq!(icon_path("https://example.com/icons/sun.png", dir), "/icons/sun.png");
        assert_eq!(icon_path("", dir), "");
    }

    #[test]
    fn missing_periods_fail_loudly() {
        let empty = ForecastResponse::default();
        let daily: ForecastResponse = fixture("forecast.json");
        let err = transform(&empty, &daily, None, Path::new(ICONS), now()).unwrap_err();
        assert_eq!(err, TransformError::MissingPeriods("hourly"));

        let hourly: ForecastResponse = fixture("forecast_hourly.json");
        let mut no_periods = daily.clone();
        if let Some(p) = no_periods.properties.as_mut() {
            p.periods = Some(Vec::new());
        }
        let err = transform(&hourly, &no_periods, None, Path::new(ICONS), now()).unwrap_err();
        assert_eq!(err, TransformError::MissingPeriods("daily"));
    }

    #[test]
    fn daily_skips_leading_night() {
        let daily: ForecastResponse = fixture("forecast.json");
        let periods = daily.properties.unwrap().periods.unwrap();
        assert_eq!(periods.len(), 14);
        assert!(!periods[0].is_daytime);

        let views = format_daily_forecast(&periods, Path::new(ICONS));
        assert_eq!(views.relative.len(), (14 - 1) / 2);
        assert_eq!(views.absolute.len(), views.relative.len());
        assert_eq!(
            views.relative.keys().collect::<Vec<_>>(),
            ["Day1", "Day2", "Day3", "Day4", "Day5", "Day6"]
        );
        // Day1 pairs periods[1] (day) with periods[2] (night), never the leading night.
        let day1 = views.relative.get("Day1").unwrap();
        assert_eq!(day1.get("Name"), Some(periods[1].name.as_str()));
        assert_eq!(
            day1.get("NightCondition"),
            periods[2].short_forecast.as_deref()
        );
        for (a, r) in views.absolute.records().zip(views.relative.records()) {
            assert_eq!(a, r);
        }
    }

    #[test]
    fn daily_merge_rules() {
        let mut day = period("2025-01-06T06:00:00-06:00", true);
        let mut night = period("2025-01-06T18:00:00-06:00", false);
        day.temperature = Some(40.0);
        night.temperature = Some(20.0);
        day.wind_speed = Some("5 to 10 mph".into());
        day.wind_direction = Some("SW".into());
        night.wind_speed = Some("15 mph".into());
        night.wind_direction = Some("NW".into());
        day.probability_of_precipitation = Some(crate::models::nws::QuantitativeValue {
            value: Some(20.0),
            unit_code: None,
        });
        night.probability_of_precipitation = Some(crate::models::nws::QuantitativeValue {
            value: Some(60.0),
            unit_code: None,
        });
        night.icon = Some("https://api.weather.gov/icons/land/night/snow,60".into());

        let views = format_daily_forecast(&[day.clone(), night.clone()], Path::new(ICONS));
        let record = views.absolute.get("Jan_6_2025").unwrap();
        assert_eq!(record.get("High"), Some("40"));
        assert_eq!(record.get("Low"), Some("20"));
        assert_eq!(record.get("WindSpeed"), Some("15 mph"));
        assert_eq!(record.get("WindDirection"), Some("NW"));
        assert_eq!(record.get("Precipitation"), Some("60%"));
        assert_eq!(record.get("NightIconPath"), Some("/icons/night/snow.png"));
        assert_eq!(record.get("DayIconPath"), Some(""));

        // Equal speeds favour the day period.
        night.wind_speed = Some("5 mph".into());
        let views = format_daily_forecast(&[day, night], Path::new(ICONS));
        assert_eq!(views.relative.get("Day1").unwrap().get("WindDirection"), Some("SW"));
    }

    #[test]
    fn daily_drops_trailing_lone_day() {
        let periods = [
            period("2025-01-06T06:00:00-06:00", true),
            period("2025-01-06T18:00:00-06:00", false),
            period("2025-01-07T06:00:00-06:00", true),
        ];
        let views = format_daily_forecast(&periods, Path::new(ICONS));
        assert_eq!(views.relative.keys().collect::<Vec<_>>(), ["Day1"]);
    }

    #[test]
    fn day_night_labels_and_celsius() {
        let mut first = period("2025-01-05T18:00:00-06:00", false);
        first.temperature = Some(-5.0);
        first.temperature_unit = Some("C".into());
        let mut second = period("2025-01-06T06:00:00-06:00", true);
        second.temperature = Some(25.0);
        second.temperature_unit = Some("C".into());
        second.probability_of_precipitation = Some(crate::models::nws::QuantitativeValue {
            value: Some(10.0),
            unit_code: None,
        });
        let third = period("2025-01-06T18:00:00-06:00", false);

        let views = format_day_night_forecast(&[first, second, third], Path::new(ICONS));
        assert_eq!(views.relative.keys().collect::<Vec<_>>(), ["Day1", "Night1"]);
        assert_eq!(
            views.absolute.keys().collect::<Vec<_>>(),
            ["Jan_6_2025_Day", "Jan_6_2025_Night"]
        );
        let day1 = views.relative.get("Day1").unwrap();
        assert_eq!(day1.get("Temperature"), Some("77"));
        assert_eq!(day1.get("Unit"), Some("F"));
        assert_eq!(day1.get("Precipitation"), Some(crate::convert::PRECIP_PLACEHOLDER));
    }

    #[test]
    fn hourly_views_share_records() {
        let hourly: ForecastResponse = fixture("forecast_hourly.json");
        let periods = hourly.properties.unwrap().periods.unwrap();
        let views = format_hourly_forecast(&periods, Path::new(ICONS), now());
        assert_eq!(views.absolute.len(), periods.len());
        assert_eq!(views.relative.len(), periods.len());
        assert_eq!(
            views.relative.keys().collect::<Vec<_>>(),
            ["Now", "_0Hrs", "_1Hrs"]
        );
        assert_eq!(
            views.absolute.keys().collect::<Vec<_>>(),
            ["Jan_5_2025_2_PM", "Jan_5_2025_3_PM", "Jan_5_2025_4_PM"]
        );
        let now_record = views.relative.get("Now").unwrap();
        assert_eq!(now_record.get("DisplayName"), Some("2 PM"));
        assert_eq!(now_record.get("Weekday"), Some("Sun"));
        assert_eq!(views.absolute.get("Jan_5_2025_2_PM"), Some(now_record));
    }

    /// Element names directly under the document root.
    fn entry_names(content: &str) -> Vec<&str> {
        content
            .lines()
            .filter_map(|line| line.strip_prefix("  <"))
            .filter(|rest| !rest.starts_with(['/', ' ']))
            .map(|rest| rest.trim_end_matches('>'))
            .collect()
    }

    #[test]
    fn written_documents_use_sanitized_labels_once() {
        let hourly: ForecastResponse = fixture("forecast_hourly.json");
        let daily: ForecastResponse = fixture("forecast.json");
        let obs: ObservationResponse = fixture("observation.json");
        let forecasts = transform(&hourly, &daily, obs.properties.as_ref(), Path::new(ICONS), now()).unwrap();
        let docs = forecasts.documents();
        let find = |kind: &str, variant: Option<&str>| {
            docs.iter()
                .find(|d| d.kind == kind && d.variant == variant)
                .map(|d| d.content.as_str())
                .unwrap()
        };

        assert_eq!(
            entry_names(find("HourlyForecast", None)),
            ["Jan_5_2025_2_PM", "Jan_5_2025_3_PM", "Jan_5_2025_4_PM", "Now", "_0Hrs", "_1Hrs"]
        );
        assert_eq!(
            entry_names(find("DailyForecast", Some("Relative"))),
            ["Day1", "Day2", "Day3", "Day4", "Day5", "Day6", "CurrentConditions"]
        );
        assert_eq!(entry_names(find("DayAndNightForecast", Some("Relative")))[0], "Day1");
        assert_eq!(entry_names(find("CurrentConditions", None)), ["Current"]);
    }

    #[test]
    fn current_conditions_record() {
        let response: ObservationResponse = fixture("observation.json");
        let record = format_current_conditions(&response.properties.unwrap(), Path::new(ICONS));
        assert_eq!(record.get("Temperature"), Some("72"));
        assert_eq!(record.get("WindSpeed"), Some("10 mph"));
        assert_eq!(record.get("WindDirection"), Some("S"));
        assert_eq!(record.get("Condition"), Some("Partly Cloudy"));
        assert_eq!(record.get("IconPath"), Some("/icons/sct.png"));

        let calm = Observation::default();
        let record = format_current_conditions(&calm, Path::new(ICONS));
        assert_eq!(record.get("WindSpeed"), Some(CALM));
        assert_eq!(record.get("Temperature"), Some(""));
    }

    #[test]
    fn current_conditions_injected_into_daily_views() {
        let hourly: ForecastResponse = fixture("forecast_hourly.json");
        let daily: ForecastResponse = fixture("forecast.json");
        let obs: ObservationResponse = fixture("observation.json");
        let forecasts = transform(&hourly, &daily, obs.properties.as_ref(), Path::new(ICONS), now()).unwrap();
        assert!(forecasts.daily.absolute.get(CURRENT_CONDITIONS_KEY).is_some());
        assert_eq!(
            forecasts.daily.relative.get(CURRENT_CONDITIONS_KEY),
            forecasts.current.as_ref()
        );
        assert_eq!(forecasts.documents().len(), 6);

        let without = transform(&hourly, &daily, None, Path::new(ICONS), now()).unwrap();
        assert!(without.daily.relative.get(CURRENT_CONDITIONS_KEY).is_none());
        assert_eq!(without.documents().len(), 5);
    }
}
