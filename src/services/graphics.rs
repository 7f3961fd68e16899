//! Graphic-name templates: short strings like `"{weekday} Forecast"` rendered against the
//! cycle time and published together as `GraphicNames.xml`.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::settings::GraphicTemplate;
use crate::xml::{Record, render_record, sanitize};

pub const GRAPHIC_NAMES_FILE: &str = "GraphicNames.xml";
pub const GRAPHIC_NAMES_ROOT: &str = "GraphicNames";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedGraphics {
    pub content: String,
    /// Placeholders no template could fill, as `name:{placeholder}`.
    pub unknown: Vec<String>,
}

fn placeholder_value(name: &str, now: &DateTime<FixedOffset>) -> Option<String> {
    let value = match name {
        "weekday" => now.format("%A").to_string(),
        "month" => now.format("%B").to_string(),
        "day" => now.format("%-d").to_string(),
        "year" => now.format("%Y").to_string(),
        "date" => now.format("%B %-d, %Y").to_string(),
        "time" => now.format("%-I:%M %p").to_string(),
        _ => return None,
    };
    Some(value)
}

/// Fill the placeholders in `template`; unknown ones stay as written and are returned.
pub fn render_template(template: &str, now: &DateTime<FixedOffset>) -> (String, Vec<String>) {
    let mut unknown = Vec::new();
    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        placeholder_value(name, now).unwrap_or_else(|| {
            unknown.push(caps[0].to_string());
            caps[0].to_string()
        })
    });
    (rendered.into_owned(), unknown)
}

pub fn render_graphics(templates: &[GraphicTemplate], now: &DateTime<FixedOffset>) -> RenderedGraphics {
    let mut record = Record::new();
    let mut unknown = Vec::new();
    for t in templates {
        let (text, missing) = render_template(&t.template, now);
        unknown.extend(missing.into_iter().map(|p| format!("{}:{}", t.name, p)));
        record.set(&sanitize(&t.name), text);
    }
    RenderedGraphics {
        content: render_record(GRAPHIC_NAMES_ROOT, &record),
        unknown,
    }
}

pub fn graphics_path() -> &'static Path {
    Path::new(GRAPHIC_NAMES_FILE)
}
