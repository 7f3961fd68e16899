//! Persisted poller settings: locations, image sources, cadences, graphic templates.
//!
//! The store owns the JSON file. Every mutation validates, then saves. A cycle never
//! sees the store itself, only a [`Settings`] snapshot taken when it starts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{DecodeError, decode_json};

pub const DEFAULT_WEATHER_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_IMAGE_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    pub name: String,
    pub url: String,
}

/// A named text with `{weekday}`-style placeholders, rendered once per weather cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicTemplate {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub locations: Vec<Location>,
    pub images: Vec<ImageSource>,
    pub weather_interval_ms: u64,
    pub image_poll_interval_ms: u64,
    pub burn_ban_enabled: bool,
    pub graphic_templates: Vec<GraphicTemplate>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            locations: Vec::new(),
            images: Vec::new(),
            weather_interval_ms: DEFAULT_WEATHER_INTERVAL_MS,
            image_poll_interval_ms: DEFAULT_IMAGE_POLL_INTERVAL_MS,
            burn_ban_enabled: false,
            graphic_templates: Vec::new(),
        }
    }
}

impl Settings {
    pub fn weather_interval(&self) -> Duration {
        Duration::from_millis(self.weather_interval_ms)
    }

    pub fn image_poll_interval(&self) -> Duration {
        Duration::from_millis(self.image_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.weather_interval_ms == 0 {
            return Err(SettingsError::Invalid("weatherIntervalMs must be greater than zero".into()));
        }
        if self.image_poll_interval_ms == 0 {
            return Err(SettingsError::Invalid("imagePollIntervalMs must be greater than zero".into()));
        }
        for loc in &self.locations {
            validate_location(loc)?;
        }
        for img in &self.images {
            validate_image(img)?;
        }
        for t in &self.graphic_templates {
            if t.name.trim().is_empty() {
                return Err(SettingsError::Invalid("graphic template name cannot be empty".into()));
            }
        }
        check_unique("location", self.locations.iter().map(|l| l.name.as_str()))?;
        check_unique("image", self.images.iter().map(|i| i.name.as_str()))?;
        check_unique("graphic template", self.graphic_templates.iter().map(|t| t.name.as_str()))?;
        Ok(())
    }
}

fn validate_location(loc: &Location) -> Result<(), SettingsError> {
    if loc.name.trim().is_empty() {
        return Err(SettingsError::Invalid("location name cannot be empty".into()));
    }
    if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude) {
        return Err(SettingsError::Invalid(format!(
            "location {} has out-of-range coordinates {},{}",
            loc.name, loc.latitude, loc.longitude
        )));
    }
    Ok(())
}

fn validate_image(img: &ImageSource) -> Result<(), SettingsError> {
    if img.name.trim().is_empty() {
        return Err(SettingsError::Invalid("image name cannot be empty".into()));
    }
    if !(img.url.starts_with("http://") || img.url.starts_with("https://")) {
        return Err(SettingsError::Invalid(format!("image {} url must be http(s): {}", img.name, img.url)));
    }
    Ok(())
}

fn check_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<(), SettingsError> {
    let mut seen = std::collections::BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SettingsError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, source: io::Error },
    Decode { path: PathBuf, source: DecodeError },
    Encode(serde_json::Error),
    Duplicate { kind: &'static str, name: String },
    NotFound { kind: &'static str, name: String },
    Invalid(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            SettingsError::Decode { path, source } => write!(f, "{}: invalid settings {}", path.display(), source),
            SettingsError::Encode(e) => write!(f, "encoding settings failed: {}", e),
            SettingsError::Duplicate { kind, name } => write!(f, "{} {} already exists", kind, name),
            SettingsError::NotFound { kind, name } => write!(f, "{} {} not found", kind, name),
            SettingsError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io { source, .. } => Some(source),
            SettingsError::Decode { source, .. } => Some(source),
            SettingsError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let bytes = fs::read(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings = decode_json(&bytes).map_err(|source| SettingsError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    settings.validate()?;
    Ok(settings)
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let io_err = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut json = serde_json::to_vec_pretty(settings).map_err(SettingsError::Encode)?;
    json.push(b'\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, &json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Open the store at `path`. A missing file means defaults; it is created on first save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = if path.exists() { read_settings(&path)? } else { Settings::default() };
        Ok(SettingsStore { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Re-read the file so edits made by other processes between cycles take effect.
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        if self.path.exists() {
            self.settings = read_settings(&self.path)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Settings {
        self.settings.clone()
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        write_settings(&self.path, &self.settings)
    }

    fn update(&mut self, change: impl FnOnce(&mut Settings) -> Result<(), SettingsError>) -> Result<(), SettingsError> {
        let mut next = self.settings.clone();
        change(&mut next)?;
        next.validate()?;
        write_settings(&self.path, &next)?;
        self.settings = next;
        Ok(())
    }

    pub fn add_location(&mut self, location: Location) -> Result<(), SettingsError> {
        self.update(|s| {
            if s.locations.iter().any(|l| l.name == location.name) {
                return Err(SettingsError::Duplicate {
                    kind: "location",
                    name: location.name.clone(),
                });
            }
            s.locations.push(location);
            Ok(())
        })
    }

    pub fn remove_location(&mut self, name: &str) -> Result<(), SettingsError> {
        self.update(|s| remove_named(&mut s.locations, "location", name, |l| &l.name))
    }

    pub fn add_image(&mut self, image: ImageSource) -> Result<(), SettingsError> {
        self.update(|s| {
            if s.images.iter().any(|i| i.name == image.name) {
                return Err(SettingsError::Duplicate {
                    kind: "image",
                    name: image.name.clone(),
                });
            }
            s.images.push(image);
            Ok(())
        })
    }

    pub fn remove_image(&mut self, name: &str) -> Result<(), SettingsError> {
        self.update(|s| remove_named(&mut s.images, "image", name, |i| &i.name))
    }

    pub fn set_weather_interval_ms(&mut self, ms: u64) -> Result<(), SettingsError> {
        self.update(|s| {
            s.weather_interval_ms = ms;
            Ok(())
        })
    }

    pub fn set_image_poll_interval_ms(&mut self, ms: u64) -> Result<(), SettingsError> {
        self.update(|s| {
            s.image_poll_interval_ms = ms;
            Ok(())
        })
    }

    pub fn set_burn_ban(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|s| {
            s.burn_ban_enabled = enabled;
            Ok(())
        })
    }

    /// Add a template, or replace the text of an existing one with the same name.
    pub fn put_graphic_template(&mut self, template: GraphicTemplate) -> Result<(), SettingsError> {
        self.update(|s| {
            match s.graphic_templates.iter_mut().find(|t| t.name == template.name) {
                Some(existing) => existing.template = template.template,
                None => s.graphic_templates.push(template),
            }
            Ok(())
        })
    }

    pub fn remove_graphic_template(&mut self, name: &str) -> Result<(), SettingsError> {
        self.update(|s| remove_named(&mut s.graphic_templates, "graphic template", name, |t| &t.name))
    }

    /// Replace everything with the settings in `path`. Nothing changes if the file is invalid.
    pub fn import(&mut self, path: &Path) -> Result<(), SettingsError> {
        let imported = read_settings(path)?;
        self.update(|s| {
            *s = imported;
            Ok(())
        })
    }

    pub fn export(&self, path: &Path) -> Result<(), SettingsError> {
        write_settings(path, &self.settings)
    }
}

fn remove_named<T>(
    items: &mut Vec<T>,
    kind: &'static str,
    name: &str,
    name_of: impl Fn(&T) -> &String,
) -> Result<(), SettingsError> {
    let before = items.len();
    items.retain(|item| name_of(item) != name);
    if items.len() == before {
        return Err(SettingsError::NotFound {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peoria() -> Location {
        Location {
            name: "Peoria".into(),
            latitude: 40.69,
            longitude: -89.59,
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.settings(), &Settings::default());
        assert_eq!(store.settings().weather_interval(), Duration::from_secs(60));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"burnBanEnabled":true,"imagePollIntervalMs":5000}"#).unwrap();
        let store = SettingsStore::open(&path).unwrap();
        assert!(store.settings().burn_ban_enabled);
        assert_eq!(store.settings().image_poll_interval_ms, 5000);
        assert_eq!(store.settings().weather_interval_ms, DEFAULT_WEATHER_INTERVAL_MS);
    }

    #[test]
    fn mutations_persist_and_enforce_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = SettingsStore::open(&path).unwrap();
        store.add_location(peoria()).unwrap();
        let err = store.add_location(peoria()).unwrap_err();
        assert!(matches!(err, SettingsError::Duplicate { kind: "location", .. }));
        store
            .add_image(ImageSource {
                name: "Radar".into(),
                url: "https://radar.test/loop.gif".into(),
            })
            .unwrap();
        store.set_burn_ban(true).unwrap();

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.settings().locations, vec![peoria()]);
        assert_eq!(reopened.settings().images.len(), 1);
        assert!(reopened.settings().burn_ban_enabled);

        store.remove_location("Peoria").unwrap();
        assert!(matches!(
            store.remove_location("Peoria").unwrap_err(),
            SettingsError::NotFound { .. }
        ));
    }

    #[test]
    fn rejects_invalid_values_without_changing_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SettingsStore::open(dir.path().join("s.json")).unwrap();
        assert!(matches!(store.set_weather_interval_ms(0), Err(SettingsError::Invalid(_))));
        assert_eq!(store.settings().weather_interval_ms, DEFAULT_WEATHER_INTERVAL_MS);
        let bad = Location {
            latitude: 120.0,
            ..peoria()
        };
        assert!(store.add_location(bad).is_err());
        assert!(store.settings().locations.is_empty());
        assert!(
            store
                .add_image(ImageSource {
                    name: "Radar".into(),
                    url: "ftp://x".into()
                })
                .is_err()
        );
    }

    #[test]
    fn graphic_templates_replace_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SettingsStore::open(dir.path().join("s.json")).unwrap();
        let t = |text: &str| GraphicTemplate {
            name: "Header".into(),
            template: text.into(),
        };
        store.put_graphic_template(t("{weekday}")).unwrap();
        store.put_graphic_template(t("{date}")).unwrap();
        assert_eq!(store.settings().graphic_templates, vec![t("{date}")]);
        store.remove_graphic_template("Header").unwrap();
        assert!(store.settings().graphic_templates.is_empty());
    }

    #[test]
    fn import_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = SettingsStore::open(dir.path().join("a.json")).unwrap();
        source.add_location(peoria()).unwrap();
        source.set_image_poll_interval_ms(30_000).unwrap();
        let exported = dir.path().join("export.json");
        source.export(&exported).unwrap();

        let mut target = SettingsStore::open(dir.path().join("b.json")).unwrap();
        target.import(&exported).unwrap();
        assert_eq!(target.snapshot(), source.snapshot());

        fs::write(&exported, r#"{"locations":[{"name":"A","latitude":1,"longitude":1},{"name":"A","latitude":2,"longitude":2}]}"#)
            .unwrap();
        assert!(matches!(target.import(&exported), Err(SettingsError::Duplicate { .. })));
        assert_eq!(target.settings().locations, vec![peoria()]);

        fs::write(&exported, r#"{"locations":[{"name":"A","latitude":"north"}]}"#).unwrap();
        let err = target.import(&exported).unwrap_err();
        assert!(err.to_string().contains("locations[0]"), "{}", err);
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let mut store = SettingsStore::open(&path).unwrap();
        store.save().unwrap();
        let mut other = SettingsStore::open(&path).unwrap();
        other.add_location(peoria()).unwrap();
        assert!(store.settings().locations.is_empty());
        store.reload().unwrap();
        assert_eq!(store.settings().locations.len(), 1);
    }
}
