//! Config loading for linewatch.
//!
//! Loads and validates YAML config files with path expansion.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::discovery::DiscoveryResult;
use crate::config::error::{suggest, ConfigError};
use crate::config::types::{Config, RawConfig, DEBOUNCE_RANGE_MS, KNOWN_KEYS, LOG_LEVELS};

/// Expand tilde in path to home directory.
///
/// Handles the following cases:
/// - `~/foo` -> `/home/user/foo`
/// - `/absolute/path` -> unchanged
/// - `relative/path` -> unchanged
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    path.to_path_buf()
}

/// Load and parse a YAML config file.
///
/// Returns the parsed RawConfig or a ConfigError with location and suggestions.
fn load_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if content.trim().is_empty() {
        return Ok(RawConfig::default());
    }

    let mut raw: RawConfig = serde_saphyr::from_str(&content)
        .map_err(|e| ConfigError::from_saphyr_error(path, &content, KNOWN_KEYS, e))?;

    // Relative startup paths belong to the file that names them
    if let Some(paths) = raw.paths.as_mut() {
        let base = path.parent().unwrap_or(Path::new(""));
        for p in paths.iter_mut() {
            let expanded = expand_path(p);
            *p = if expanded.is_relative() {
                base.join(expanded)
            } else {
                expanded
            };
        }
    }

    Ok(raw)
}

/// Apply defaults and check value ranges.
///
/// `origin` is the file blamed in validation errors.
fn validate(raw: RawConfig, origin: &Path) -> Result<Config, ConfigError> {
    let defaults = Config::default();

    let debounce = match raw.debounce_ms {
        Some(ms) if !DEBOUNCE_RANGE_MS.contains(&ms) => {
            return Err(ConfigError::validation(
                origin,
                format!(
                    "debounce_ms must be between {} and {}, got {}",
                    DEBOUNCE_RANGE_MS.start(),
                    DEBOUNCE_RANGE_MS.end(),
                    ms
                ),
            ));
        }
        Some(ms) => Duration::from_millis(ms),
        None => defaults.debounce,
    };

    let index_interval = match raw.index_interval {
        Some(0) => {
            return Err(ConfigError::validation(
                origin,
                "index_interval must be at least 1",
            ));
        }
        Some(n) => n,
        None => defaults.index_interval,
    };

    let log_level = match raw.log_level {
        Some(level) => {
            let normalized = level.trim().to_ascii_lowercase();
            if !LOG_LEVELS.contains(&normalized.as_str()) {
                return Err(ConfigError::Validation {
                    path: origin.to_path_buf(),
                    message: format!(
                        "unknown log_level '{}'. Available levels: {}",
                        level,
                        LOG_LEVELS.join(", ")
                    ),
                    suggestion: suggest(&normalized, LOG_LEVELS.iter().copied()),
                });
            }
            normalized
        }
        None => defaults.log_level,
    };

    Ok(Config {
        debounce,
        backend: raw.backend.unwrap_or(defaults.backend),
        index_interval,
        extensions: raw.extensions.unwrap_or(defaults.extensions),
        recursive: raw.recursive.unwrap_or(defaults.recursive),
        log_level,
        paths: raw.paths.unwrap_or_default(),
    })
}

/// Load config from one explicit file (`--config FILE`).
pub fn load_single_file(path: &Path) -> Result<Config, ConfigError> {
    let raw = load_file(path)?;
    validate(raw, path)
}

/// Load config from discovered config files.
///
/// The global file is read first and the project file overrides it key by
/// key. Returns the defaults if no config files exist.
pub fn load(discovery: &DiscoveryResult) -> Result<Config, ConfigError> {
    let mut merged = RawConfig::default();
    let mut origin: Option<&Path> = None;

    if let Some(global_path) = &discovery.global_config {
        merged.merge(load_file(global_path)?);
        origin = Some(global_path.as_path());
    }

    if let Some(project_path) = &discovery.project_config {
        merged.merge(load_file(project_path)?);
        origin = Some(project_path.as_path());
    }

    match origin {
        Some(origin) => validate(merged, origin),
        None => Ok(Config::default()),
    }
}
