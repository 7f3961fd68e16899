//! Severe-weather alert classification.
//!
//! Raw alerts are mapped onto four tracked types, the most recently sent alert wins
//! per type, and every location always gets exactly one record per type: the winner,
//! or a fixed "No alert in effect" placeholder.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::models::nws::{AlertProperties, first_parameter};
use crate::xml::{Record, render_record};

pub const NO_ALERT_EVENT: &str = "No alert in effect";

/// Wraps emphasized words in the processed alert text.
pub const EMPHASIS: &str = "**";

/// Field order of every alert record, populated or placeholder.
pub const ALERT_FIELDS: [&str; 15] = [
    "Type",
    "Event",
    "Headline",
    "Description",
    "ProcessedText",
    "Instruction",
    "AreaDesc",
    "Severity",
    "Urgency",
    "Certainty",
    "Sent",
    "Effective",
    "Expires",
    "Ends",
    "SenderName",
];

/// The four alert categories that always get a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertTypeKey {
    TornadoWarning,
    SevereThunderstormWarning,
    TornadoWatch,
    SevereThunderstormWatch,
}

impl AlertTypeKey {
    pub const ALL: [AlertTypeKey; 4] = [
        AlertTypeKey::TornadoWarning,
        AlertTypeKey::SevereThunderstormWarning,
        AlertTypeKey::TornadoWatch,
        AlertTypeKey::SevereThunderstormWatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertTypeKey::TornadoWarning => "TornadoWarning",
            AlertTypeKey::SevereThunderstormWarning => "SevereThunderstormWarning",
            AlertTypeKey::TornadoWatch => "TornadoWatch",
            AlertTypeKey::SevereThunderstormWatch => "SevereThunderstormWatch",
        }
    }
}

/// Normalized event type. A tornado emergency is filed under the tornado warning key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    TornadoEmergency,
    TornadoWarning,
    SevereThunderstormWarning,
    TornadoWatch,
    SevereThunderstormWatch,
}

impl AlertType {
    // Most specific first, so substring matching prefers "Tornado Emergency" over "Tornado".
    const KNOWN: [AlertType; 5] = [
        AlertType::TornadoEmergency,
        AlertType::SevereThunderstormWarning,
        AlertType::SevereThunderstormWatch,
        AlertType::TornadoWarning,
        AlertType::TornadoWatch,
    ];

    pub fn event_name(&self) -> &'static str {
        match self {
            AlertType::TornadoEmergency => "Tornado Emergency",
            AlertType::TornadoWarning => "Tornado Warning",
            AlertType::SevereThunderstormWarning => "Severe Thunderstorm Warning",
            AlertType::TornadoWatch => "Tornado Watch",
            AlertType::SevereThunderstormWatch => "Severe Thunderstorm Watch",
        }
    }

    pub fn key(&self) -> AlertTypeKey {
        match self {
            AlertType::TornadoEmergency | AlertType::TornadoWarning => AlertTypeKey::TornadoWarning,
            AlertType::SevereThunderstormWarning => AlertTypeKey::SevereThunderstormWarning,
            AlertType::TornadoWatch => AlertTypeKey::TornadoWatch,
            AlertType::SevereThunderstormWatch => AlertTypeKey::SevereThunderstormWatch,
        }
    }
}

/// Map a raw event name onto a tracked type, or `None` if it is not one we track.
///
/// Exact (case-insensitive) names are tried first, then substring matches. A tornado
/// warning with a catastrophic damage threat becomes a tornado emergency.
pub fn normalize_alert_type(event: &str, parameters: Option<&BTreeMap<String, Value>>) -> Option<AlertType> {
    let event = event.trim().to_lowercase();
    let matched = AlertType::KNOWN
        .iter()
        .find(|t| t.event_name().to_lowercase() == event)
        .or_else(|| {
            AlertType::KNOWN
                .iter()
                .find(|t| event.contains(&t.event_name().to_lowercase()))
        })
        .copied()?;

    let catastrophic = first_parameter(parameters, "tornadoDamageThreat")
        .is_some_and(|threat| threat.eq_ignore_ascii_case("catastrophic"));
    if matched == AlertType::TornadoWarning && catastrophic {
        return Some(AlertType::TornadoEmergency);
    }
    Some(matched)
}

/// Latest `Actual` alert per tracked key. Alerts without a sent time rank lowest;
/// on equal sent times the earlier entry is kept.
pub fn select_latest_per_type(alerts: &[AlertProperties]) -> BTreeMap<AlertTypeKey, (AlertType, &AlertProperties)> {
    let mut latest: BTreeMap<AlertTypeKey, (AlertType, &AlertProperties)> = BTreeMap::new();
    for alert in alerts {
        if alert.status.as_deref() != Some("Actual") {
            continue;
        }
        let Some(alert_type) = alert
            .event
            .as_deref()
            .and_then(|e| normalize_alert_type(e, alert.parameters.as_ref()))
        else {
            continue;
        };
        let key = alert_type.key();
        let newer = match latest.get(&key) {
            Some((_, current)) => alert.sent > current.sent,
            None => true,
        };
        if newer {
            latest.insert(key, (alert_type, alert));
        }
    }
    latest
}

fn placeholder(key: AlertTypeKey) -> Record {
    let mut record = Record::new();
    for field in ALERT_FIELDS {
        record.set(field, "");
    }
    record.set("Type", key.as_str());
    record.set("Event", NO_ALERT_EVENT);
    record
}

pub fn build_alert_record(key: AlertTypeKey, winner: Option<(AlertType, &AlertProperties)>) -> Record {
    let Some((alert_type, alert)) = winner else {
        return placeholder(key);
    };
    let text = process_alert_text(
        alert.description.as_deref().unwrap_or_default(),
        alert.first_parameter("NWSheadline"),
    );
    let time = |t: &Option<chrono::DateTime<chrono::FixedOffset>>| t.map(|t| t.to_rfc3339()).unwrap_or_default();
    let text_field = |v: &Option<String>| v.clone().unwrap_or_default();

    let mut record = placeholder(key);
    record.set("Event", alert_type.event_name());
    record.set("Headline", text_field(&alert.headline));
    record.set("Description", text.description);
    record.set("ProcessedText", text.processed);
    record.set("Instruction", text_field(&alert.instruction));
    record.set("AreaDesc", text_field(&alert.area_desc));
    record.set("Severity", text_field(&alert.severity));
    record.set("Urgency", text_field(&alert.urgency));
    record.set("Certainty", text_field(&alert.certainty));
    record.set("Sent", time(&alert.sent));
    record.set("Effective", time(&alert.effective));
    record.set("Expires", time(&alert.expires));
    record.set("Ends", time(&alert.ends));
    record.set("SenderName", text_field(&alert.sender_name));
    record
}

/// One record per tracked key, in [`AlertTypeKey::ALL`] order.
pub fn build_alert_records(alerts: &[AlertProperties]) -> Vec<(AlertTypeKey, Record)> {
    let latest = select_latest_per_type(alerts);
    AlertTypeKey::ALL
        .iter()
        .map(|key| (*key, build_alert_record(*key, latest.get(key).copied())))
        .collect()
}

pub fn render_alert(record: &Record) -> String {
    render_record("Alert", record)
}

// Text processing

static AWIPS_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9. ]{5,}[\r\n]+").expect("valid regex"));
static TIME_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\d:])(\d{1,2})(\d{2})?\s?(AM|PM)\s+([A-Z]{2,4})\b").expect("valid regex")
});
static TORNADO_WARNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btornado\s+warning\b").expect("valid regex"));
static TORNADO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btornado\b").expect("valid regex"));
static LEADING_WARNING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s+warning\b").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedAlertText {
    /// Description with the header removed and time codes reformatted.
    pub description: String,
    /// Headline + description, with tornado emphasis.
    pub processed: String,
}

pub fn process_alert_text(description: &str, nws_headline: Option<&str>) -> ProcessedAlertText {
    let description = format_time_codes(&AWIPS_HEADER.replace(description, ""));
    let combined = match nws_headline.map(str::trim).filter(|h| !h.is_empty()) {
        Some(headline) => format!("{}\n{}", format_time_codes(headline), description),
        None => description.clone(),
    };
    ProcessedAlertText {
        description,
        processed: emphasize_tornado(&combined),
    }
}

/// `700 PM CDT` -> `7:00 PM CDT`, `9 PM CDT` -> `9:00 PM CDT`.
pub fn format_time_codes(text: &str) -> String {
    TIME_CODE
        .replace_all(text, |caps: &Captures| {
            let minutes = caps.get(3).map(|m| m.as_str()).unwrap_or("00");
            format!("{}{}:{} {} {}", &caps[1], &caps[2], minutes, &caps[4], &caps[5])
        })
        .into_owned()
}

/// Emphasize every "Tornado Warning", then every other standalone "Tornado".
pub fn emphasize_tornado(text: &str) -> String {
    let marked = TORNADO_WARNING.replace_all(text, format!("{EMPHASIS}${{0}}{EMPHASIS}").as_str());
    let mut out = String::with_capacity(marked.len());
    let mut last = 0;
    for m in TORNADO.find_iter(&marked) {
        let already = marked[..m.start()].ends_with(EMPHASIS);
        let warning_follows = LEADING_WARNING.is_match(&marked[m.end()..]);
        if already || warning_follows {
            continue;
        }
        out.push_str(&marked[last..m.start()]);
        out.push_str(EMPHASIS);
        out.push_str(m.as_str());
        out.push_str(EMPHASIS);
        last = m.end();
    }
    out.push_str(&marked[last..]);
    out
}
