//! Where finished documents go.
//!
//! Paths are relative to the output root. [`FsOutput`] writes through a temporary
//! sibling file and renames it into place, so readers see either the old or the new
//! document, never a partial one. A batch is staged in full before anything is renamed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const FORECAST_DIR: &str = "Forecasts";
pub const ALERT_DIR: &str = "Alerts";
pub const IMAGE_DIR: &str = "Images";

pub trait OutputSink {
    /// Write every file, or leave all existing files as they were.
    fn write_all(&self, files: &[(PathBuf, &[u8])]) -> io::Result<()>;

    fn write(&self, relative: &Path, content: &[u8]) -> io::Result<()> {
        self.write_all(&[(relative.to_path_buf(), content)])
    }
}

#[derive(Debug, Clone)]
pub struct FsOutput {
    root: PathBuf,
}

impl FsOutput {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsOutput { root: root.into() }
    }

    /// Write `content` next to its target. Returns `(tmp, target)`.
    fn stage(&self, relative: &Path, content: &[u8]) -> io::Result<(PathBuf, PathBuf)> {
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = target.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })?;
        Ok((tmp, target))
    }
}

fn discard<'p>(tmps: impl IntoIterator<Item = &'p PathBuf>) {
    for tmp in tmps {
        let _ = fs::remove_file(tmp);
    }
}

impl OutputSink for FsOutput {
    fn write_all(&self, files: &[(PathBuf, &[u8])]) -> io::Result<()> {
        let mut staged = Vec::with_capacity(files.len());
        for (relative, content) in files {
            match self.stage(relative, content) {
                Ok(pair) => staged.push(pair),
                Err(e) => {
                    discard(staged.iter().map(|(tmp, _)| tmp));
                    return Err(e);
                }
            }
        }
        for (i, (tmp, target)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, target) {
                discard(staged[i..].iter().map(|(tmp, _)| tmp));
                return Err(e);
            }
        }
        Ok(())
    }
}

/// `Forecasts/{location}-{kind}[-{variant}].xml`
pub fn forecast_path(location: &str, kind: &str, variant: Option<&str>) -> PathBuf {
    let name = match variant {
        Some(v) => format!("{}-{}-{}.xml", location, kind, v),
        None => format!("{}-{}.xml", location, kind),
    };
    Path::new(FORECAST_DIR).join(name)
}

/// `Alerts/{location}-{key}-Alert.xml`
pub fn alert_path(location: &str, key: &str) -> PathBuf {
    Path::new(ALERT_DIR).join(format!("{}-{}-Alert.xml", location, key))
}

pub fn image_path(image: &str, extension: &str) -> PathBuf {
    Path::new(IMAGE_DIR).join(format!("{}.{}", image, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_replaces_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = FsOutput::new(dir.path());
        let rel = forecast_path("Peoria", "DailyForecast", Some("Relative"));
        out.write(&rel, b"<A/>").unwrap();
        out.write(&rel, b"<B/>").unwrap();
        let written = dir.path().join("Forecasts").join("Peoria-DailyForecast-Relative.xml");
        assert_eq!(fs::read(&written).unwrap(), b"<B/>");
        assert_eq!(fs::read_dir(dir.path().join("Forecasts")).unwrap().count(), 1);
    }

    #[test]
    fn failed_batch_leaves_every_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let out = FsOutput::new(dir.path());
        let first = forecast_path("Peoria", "HourlyForecast", None);
        let second = forecast_path("Peoria", "DailyForecast", None);
        out.write_all(&[(first.clone(), b"old-1".as_slice()), (second.clone(), b"old-2".as_slice())])
            .unwrap();

        // A directory squatting on the temp name makes the second staged write fail.
        fs::create_dir(dir.path().join("Forecasts/Peoria-DailyForecast.xml.tmp")).unwrap();
        let err = out.write_all(&[(first, b"new-1".as_slice()), (second, b"new-2".as_slice())]);
        assert!(err.is_err());

        let forecasts = dir.path().join("Forecasts");
        assert_eq!(fs::read(forecasts.join("Peoria-HourlyForecast.xml")).unwrap(), b"old-1");
        assert_eq!(fs::read(forecasts.join("Peoria-DailyForecast.xml")).unwrap(), b"old-2");
        assert!(!forecasts.join("Peoria-HourlyForecast.xml.tmp").exists());
    }

    #[test]
    fn path_shapes() {
        assert_eq!(
            forecast_path("Peoria", "HourlyForecast", None),
            Path::new("Forecasts/Peoria-HourlyForecast.xml")
        );
        assert_eq!(
            alert_path("Peoria", "TornadoWatch"),
            Path::new("Alerts/Peoria-TornadoWatch-Alert.xml")
        );
        assert_eq!(image_path("Radar", "gif"), Path::new("Images/Radar.gif"));
    }
}
