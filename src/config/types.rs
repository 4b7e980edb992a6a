//! Config types for linewatch.
//!
//! Defines structures for parsing and representing configuration files.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::reader::{Backend, StoreOptions, DEFAULT_INDEX_INTERVAL};
use crate::registry::filter::DEFAULT_EXTENSIONS;
use crate::registry::{FileFilter, RegistryOptions};
use crate::watcher::DEFAULT_DEBOUNCE;

/// Accepted `debounce_ms` range
pub const DEBOUNCE_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=5000;

/// Accepted `log_level` values
pub const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Keys accepted at the top level of a config file
pub const KNOWN_KEYS: &[&str] = &[
    "debounce_ms",
    "backend",
    "index_interval",
    "extensions",
    "recursive",
    "log_level",
    "paths",
];

/// Raw config file structure (used for parsing).
///
/// Every key is optional so a project file can override single keys of the
/// global one. Unknown fields are rejected with an error.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub debounce_ms: Option<u64>,
    pub backend: Option<Backend>,
    pub index_interval: Option<usize>,
    pub extensions: Option<Vec<String>>,
    pub recursive: Option<bool>,
    pub log_level: Option<String>,
    /// Files or directories to open when none are given on the command line.
    /// May contain tilde; relative paths are relative to the config file.
    pub paths: Option<Vec<PathBuf>>,
}

impl RawConfig {
    /// Overlay the keys set in `other` onto `self`.
    pub fn merge(&mut self, other: RawConfig) {
        let RawConfig {
            debounce_ms,
            backend,
            index_interval,
            extensions,
            recursive,
            log_level,
            paths,
        } = other;
        self.debounce_ms = debounce_ms.or(self.debounce_ms.take());
        self.backend = backend.or(self.backend.take());
        self.index_interval = index_interval.or(self.index_interval.take());
        self.extensions = extensions.or(self.extensions.take());
        self.recursive = recursive.or(self.recursive.take());
        self.log_level = log_level.or(self.log_level.take());
        self.paths = paths.or(self.paths.take());
    }
}

/// Validated configuration with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub debounce: Duration,
    pub backend: Backend,
    pub index_interval: usize,
    pub extensions: Vec<String>,
    /// Default recursion for directories opened from the command line
    pub recursive: bool,
    pub log_level: String,
    /// Expanded startup paths
    pub paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            backend: Backend::default(),
            index_interval: DEFAULT_INDEX_INTERVAL,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            recursive: false,
            log_level: "warn".to_string(),
            paths: Vec::new(),
        }
    }
}

impl Config {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            backend: self.backend,
            index_interval: self.index_interval,
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            store: self.store_options(),
            debounce: self.debounce,
            filter: FileFilter::new(&self.extensions),
        }
    }
}
