pub mod models {
    pub mod nws;
}

pub mod alerts;
pub mod client;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod envfile;
pub mod forecast;
pub mod labels;
pub mod output;
pub mod settings;
pub mod utils;
pub mod xml;
pub mod services {
    pub mod cycle;
    pub mod graphics;
    pub mod images;
    pub mod retry;
    pub mod scheduler;
    pub mod weather;
}

use crate::client::HttpClient;
use crate::config::Config;
use crate::diagnostics::{DiagnosticsReporter, WebhookMap};
use crate::output::FsOutput;
use crate::services::cycle::CycleOutcome;
use crate::services::images::{CommandCapture, ImagePoller, ScriptedCapture};
use crate::services::scheduler::{CycleKind, Scheduler, StatusBanner};
use crate::services::weather::WeatherPoller;
use crate::settings::{GraphicTemplate, ImageSource, Location, Settings, SettingsStore};
use chrono::Utc;
use log::{error, info, warn};
use std::cell::{Cell, RefCell};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot edits of the settings file; the process exits afterwards.
#[derive(Debug, Clone, PartialEq)]
enum SettingsAction {
    Import(PathBuf),
    Export(PathBuf),
    AddLocation(Location),
    RemoveLocation(String),
    AddImage(ImageSource),
    RemoveImage(String),
    WeatherInterval(u64),
    ImageInterval(u64),
    BurnBan(bool),
    PutGraphic(GraphicTemplate),
    RemoveGraphic(String),
}

#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    env_file: Option<PathBuf>,
    action: Option<SettingsAction>,
    /// Run each cycle once, then exit.
    once: bool,
}

fn next_value(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("`{}` requires a value", flag))?
        .into_string()
        .map_err(|_| format!("`{}` value contains invalid UTF-8", flag))
}

fn parse_number(flag: &str, raw: String) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| format!("`{}` expects a number, got {}", flag, raw))
}

fn parse_cli(args: impl IntoIterator<Item = OsString>) -> Result<CliOptions, String> {
    let mut args = args.into_iter();
    let mut opts = CliOptions::default();

    while let Some(arg) = args.next() {
        let Some(flag) = arg.to_str() else {
            return Err("argument contains invalid UTF-8".to_string());
        };
        let action = match flag {
            "--env-file" => {
                if opts.env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                opts.env_file = Some(PathBuf::from(next_value(&mut args, flag)?));
                None
            }
            s if s.starts_with("--env-file=") => {
                if opts.env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path = &s["--env-file=".len()..];
                if path.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                opts.env_file = Some(PathBuf::from(path));
                None
            }
            "--once" => {
                opts.once = true;
                None
            }
            "--import-settings" => Some(SettingsAction::Import(next_value(&mut args, flag)?.into())),
            "--export-settings" => Some(SettingsAction::Export(next_value(&mut args, flag)?.into())),
            "--add-location" => {
                let name = next_value(&mut args, flag)?;
                let latitude = parse_number(flag, next_value(&mut args, flag)?)?;
                let longitude = parse_number(flag, next_value(&mut args, flag)?)?;
                Some(SettingsAction::AddLocation(Location {
                    name,
                    latitude,
                    longitude,
                }))
            }
            "--remove-location" => Some(SettingsAction::RemoveLocation(next_value(&mut args, flag)?)),
            "--add-image" => {
                let name = next_value(&mut args, flag)?;
                let url = next_value(&mut args, flag)?;
                Some(SettingsAction::AddImage(ImageSource { name, url }))
            }
            "--remove-image" => Some(SettingsAction::RemoveImage(next_value(&mut args, flag)?)),
            "--weather-interval-ms" | "--image-interval-ms" => {
                let raw = next_value(&mut args, flag)?;
                let ms = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| format!("`{}` expects milliseconds, got {}", flag, raw))?;
                Some(if flag == "--weather-interval-ms" {
                    SettingsAction::WeatherInterval(ms)
                } else {
                    SettingsAction::ImageInterval(ms)
                })
            }
            "--burn-ban" => match next_value(&mut args, flag)?.as_str() {
                "on" | "true" | "1" => Some(SettingsAction::BurnBan(true)),
                "off" | "false" | "0" => Some(SettingsAction::BurnBan(false)),
                other => return Err(format!("`--burn-ban` expects on or off, got {}", other)),
            },
            "--put-graphic" => {
                let name = next_value(&mut args, flag)?;
                let template = next_value(&mut args, flag)?;
                Some(SettingsAction::PutGraphic(GraphicTemplate { name, template }))
            }
            "--remove-graphic" => Some(SettingsAction::RemoveGraphic(next_value(&mut args, flag)?)),
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        };
        if let Some(action) = action {
            if opts.action.is_some() {
                return Err("only one settings command may be given at a time".to_string());
            }
            opts.action = Some(action);
        }
    }
    Ok(opts)
}

fn apply_settings_action(action: &SettingsAction) -> Result<(), String> {
    let cfg = Config::from_env()?;
    let mut store = SettingsStore::open(&cfg.settings_file).map_err(|e| format!("Loading settings failed: {}", e))?;
    let result = match action {
        SettingsAction::Import(path) => store.import(path),
        SettingsAction::Export(path) => store.export(path),
        SettingsAction::AddLocation(location) => store.add_location(location.clone()),
        SettingsAction::RemoveLocation(name) => store.remove_location(name),
        SettingsAction::AddImage(image) => store.add_image(image.clone()),
        SettingsAction::RemoveImage(name) => store.remove_image(name),
        SettingsAction::WeatherInterval(ms) => store.set_weather_interval_ms(*ms),
        SettingsAction::ImageInterval(ms) => store.set_image_poll_interval_ms(*ms),
        SettingsAction::BurnBan(enabled) => store.set_burn_ban(*enabled),
        SettingsAction::PutGraphic(template) => store.put_graphic_template(template.clone()),
        SettingsAction::RemoveGraphic(name) => store.remove_graphic_template(name),
    };
    result.map_err(|e| format!("Settings command failed: {}", e))?;
    let s = store.settings();
    info!(
        "Settings saved to {} ({} location(s), {} image(s), {} graphic template(s), weather every {}ms, images every {}ms, burn ban {})",
        store.path().display(),
        s.locations.len(),
        s.images.len(),
        s.graphic_templates.len(),
        s.weather_interval_ms,
        s.image_poll_interval_ms,
        if s.burn_ban_enabled { "on" } else { "off" }
    );
    Ok(())
}

/// Re-read the settings file at cycle start; keep the last good settings if it is broken.
fn refresh_settings(store: &RefCell<SettingsStore>) -> Settings {
    let mut store = store.borrow_mut();
    if let Err(e) = store.reload() {
        warn!("Settings: reload failed, keeping previous settings: {}", e);
    }
    store.snapshot()
}

fn publish_banner(banner: &RefCell<StatusBanner>, kind: CycleKind, outcome: &CycleOutcome) {
    let mut banner = banner.borrow_mut();
    if banner.apply(kind, outcome) {
        match banner.message() {
            Some(message) => warn!("Banner: {}", message),
            None => info!("Banner: cleared"),
        }
    }
}

pub fn run(once: bool) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (output_dir={}, settings_file={}, icons_dir={}, api_base={}, request_timeout={}s, diagnostics={}, capture_command={})",
        cfg.output_dir.display(),
        cfg.settings_file.display(),
        cfg.icons_dir.display(),
        cfg.api_base,
        cfg.request_timeout.as_secs(),
        if cfg.diagnostics_id.is_some() { "on" } else { "off" },
        cfg.capture_command.as_deref().unwrap_or("-")
    );

    // 2) Settings store
    let store = SettingsStore::open(&cfg.settings_file).map_err(|e| format!("Loading settings failed: {}", e))?;
    {
        let s = store.settings();
        info!(
            "Settings loaded: {} location(s), {} image(s), weather every {}ms, images every {}ms",
            s.locations.len(),
            s.images.len(),
            s.weather_interval_ms,
            s.image_poll_interval_ms
        );
    }

    // 3) Collaborators
    let http = HttpClient::new(cfg.user_agent.clone(), cfg.request_timeout);
    let webhooks = match &cfg.webhook_map {
        Some(path) => {
            WebhookMap::load(path).map_err(|e| format!("Loading webhook map {} failed: {}", path.display(), e))?
        }
        None => WebhookMap::default(),
    };
    if cfg.diagnostics_id.is_some() && webhooks.len() == 0 {
        warn!("Diagnostics: WXFEED_DIAGNOSTICS_ID is set but the webhook map is empty; nothing will be posted");
    }
    let diagnostics = DiagnosticsReporter::new(cfg.diagnostics_id.clone(), webhooks, &http);
    let output = FsOutput::new(&cfg.output_dir);
    let capture = cfg.capture_command.as_deref().map(CommandCapture::new);

    let weather = WeatherPoller::new(&http, &output, &diagnostics, &cfg.api_base, &cfg.icons_dir);
    let images = ImagePoller::new(
        &http,
        &output,
        &diagnostics,
        capture.as_ref().map(|c| c as &dyn ScriptedCapture),
    );

    // 4) Schedule both cycles
    let store = RefCell::new(store);
    let banner = RefCell::new(StatusBanner::default());
    let stop = Arc::new(AtomicBool::new(false));
    let remaining = Cell::new(2u8);
    let finish_once = || {
        if once {
            remaining.set(remaining.get().saturating_sub(1));
            if remaining.get() == 0 {
                stop.store(true, Ordering::SeqCst);
            }
        }
    };

    let mut scheduler = Scheduler::new(Arc::clone(&stop));
    scheduler.add("weather", || {
        let settings = refresh_settings(&store);
        let outcome = weather.run_cycle(&settings, Utc::now());
        publish_banner(&banner, CycleKind::Weather, &outcome);
        finish_once();
        settings.weather_interval()
    });
    scheduler.add("images", || {
        let settings = refresh_settings(&store);
        let outcome = images.run_cycle(&settings);
        publish_banner(&banner, CycleKind::Images, &outcome);
        finish_once();
        settings.image_poll_interval()
    });
    scheduler.run();

    Ok(())
}

fn main() {
    let cli = match parse_cli(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };
    let loaded_env = match envfile::load(cli.env_file.clone()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "wxfeed {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    let result = match &cli.action {
        Some(action) => apply_settings_action(action),
        None => run(cli.once),
    };
    if let Err(e) = result {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions, String> {
        parse_cli(args.iter().map(OsString::from))
    }

    #[test]
    fn no_arguments_means_poll_forever() {
        assert_eq!(parse(&[]).unwrap(), CliOptions::default());
    }

    #[test]
    fn env_file_forms() {
        assert_eq!(parse(&["--env-file", "a.env"]).unwrap().env_file, Some(PathBuf::from("a.env")));
        assert_eq!(parse(&["--env-file=b.env"]).unwrap().env_file, Some(PathBuf::from("b.env")));
        assert!(parse(&["--env-file=a", "--env-file", "b"]).is_err());
        assert!(parse(&["--env-file="]).is_err());
        assert!(parse(&["--env-file"]).is_err());
    }

    #[test]
    fn settings_commands() {
        let opts = parse(&["--once", "--add-location", "Peoria", "40.69", "-89.59"]).unwrap();
        assert!(opts.once);
        assert_eq!(
            opts.action,
            Some(SettingsAction::AddLocation(Location {
                name: "Peoria".into(),
                latitude: 40.69,
                longitude: -89.59,
            }))
        );
        assert_eq!(
            parse(&["--import-settings", "s.json"]).unwrap().action,
            Some(SettingsAction::Import("s.json".into()))
        );
        assert_eq!(
            parse(&["--burn-ban", "off"]).unwrap().action,
            Some(SettingsAction::BurnBan(false))
        );
        assert_eq!(
            parse(&["--image-interval-ms", "30000"]).unwrap().action,
            Some(SettingsAction::ImageInterval(30_000))
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(parse(&["--add-location", "Peoria", "north", "1"]).is_err());
        assert!(parse(&["--burn-ban", "maybe"]).is_err());
        assert!(parse(&["--export-settings", "a", "--remove-image", "b"]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
    }
}
