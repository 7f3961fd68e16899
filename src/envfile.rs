//! `.env` loading for `--env-file`. Values already present in the process environment win.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
    pub applied: usize,
}

/// Load `explicit` if given (it must exist), else `./.env` when present.
pub fn load(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, is_explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path, true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };
    let applied = apply_file(&path)?;
    Ok(Some(LoadedEnvFile {
        path,
        explicit: is_explicit,
        applied,
    }))
}

fn apply_file(path: &Path) -> Result<usize, String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mut applied = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        let Some((key, value)) =
            parse_assignment(&line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(&key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/// `KEY=value`, `export KEY=value`, quoted values, trailing `# comments`. Blank and comment lines give `None`.
pub fn parse_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let body = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw) = body.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }
    Ok(Some((key.to_string(), parse_value(raw)?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix('"') {
        parse_quoted(rest, '"', true)
    } else if let Some(rest) = raw.strip_prefix('\'') {
        parse_quoted(rest, '\'', false)
    } else {
        Ok(raw.split('#').next().unwrap_or_default().trim_end().to_string())
    }
}

/// Read up to the closing `quote`; only a comment may follow it.
fn parse_quoted(input: &str, quote: char, escapes: bool) -> Result<String, String> {
    let kind = if quote == '"' { "double" } else { "single" };
    let mut value = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if escapes && ch == '\\' {
            let escaped = chars
                .next()
                .ok_or_else(|| format!("unterminated escape sequence in {}-quoted value", kind))?;
            value.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
        } else if ch == quote {
            let rest = chars.as_str().trim();
            return if rest.is_empty() || rest.starts_with('#') {
                Ok(value)
            } else {
                Err(format!("unexpected characters after closing {} quote", kind))
            };
        } else {
            value.push(ch);
        }
    }
    Err(format!("unterminated {}-quoted value", kind))
}
