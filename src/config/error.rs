//! Config error types for linewatch.
//!
//! Provides rich error messages with file locations and typo suggestions.

use std::fmt;
use std::path::{Path, PathBuf};

use strsim::jaro_winkler;

/// Minimum similarity for a "did you mean" hint
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Error loading or parsing a config file.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the config file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML parse error.
    Parse {
        path: PathBuf,
        message: String,
        line: Option<usize>,
        column: Option<usize>,
        suggestion: Option<String>,
    },

    /// Validation error (semantic errors after parsing).
    Validation {
        path: PathBuf,
        message: String,
        suggestion: Option<String>,
    },
}

impl ConfigError {
    /// Build a parse error from a serde-saphyr failure.
    ///
    /// Unknown keys get a location (found by scanning `content`) and the
    /// closest entry of `known_keys` as a suggestion.
    pub fn from_saphyr_error(
        path: &Path,
        content: &str,
        known_keys: &[&str],
        err: serde_saphyr::Error,
    ) -> Self {
        let message = err.to_string();
        let first_line = message.lines().next().unwrap_or_default().to_string();

        let (line, column, suggestion) = match unknown_field(&message) {
            Some(field) => {
                let location = find_key(content, &field);
                let suggestion = suggest(&field, known_keys.iter().copied());
                (
                    location.map(|(l, _)| l),
                    location.map(|(_, c)| c),
                    suggestion,
                )
            }
            None => (None, None, None),
        };

        ConfigError::Parse {
            path: path.to_path_buf(),
            message: first_line,
            line,
            column,
            suggestion,
        }
    }

    pub fn validation(path: &Path, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            path: path.to_path_buf(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Format error in Cargo-style format.
    pub fn format_cargo_style(&self) -> String {
        match self {
            ConfigError::Io { path, source } => {
                format!(
                    "error: cannot read config file\n  --> {}\n  |\n  = {}\n",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse {
                path,
                message,
                line,
                column,
                suggestion,
            } => {
                let location = match (line, column) {
                    (Some(l), Some(c)) => format!("{}:{}:{}", path.display(), l, c),
                    (Some(l), None) => format!("{}:{}", path.display(), l),
                    _ => format!("{}", path.display()),
                };
                let mut output = format!("error: {}\n  --> {}\n  |\n", message, location);
                push_suggestion(&mut output, suggestion);
                output
            }
            ConfigError::Validation {
                path,
                message,
                suggestion,
            } => {
                let mut output = format!("error: {}\n  --> {}\n  |\n", message, path.display());
                push_suggestion(&mut output, suggestion);
                output
            }
        }
    }
}

fn push_suggestion(output: &mut String, suggestion: &Option<String>) {
    if let Some(suggestion) = suggestion {
        output.push_str(&format!("  = help: did you mean `{}`?\n", suggestion));
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_cargo_style())
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Closest candidate to `name`, if any is similar enough.
pub fn suggest<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    candidates
        .into_iter()
        .filter(|known| *known != name)
        .map(|known| (known, jaro_winkler(name, known)))
        .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(known, _)| known.to_string())
}

/// Name of the offending key in an "unknown field `x`, ..." message.
fn unknown_field(message: &str) -> Option<String> {
    let rest = &message[message.find("unknown field")?..];
    rest.split('`').nth(1).map(str::to_string)
}

/// 1-based line and column of a top-level `key:` in YAML text.
fn find_key(content: &str, key: &str) -> Option<(usize, usize)> {
    content.lines().enumerate().find_map(|(i, line)| {
        let trimmed = line.trim_start();
        let rest = trimmed.strip_prefix(key)?;
        rest.trim_start()
            .starts_with(':')
            .then(|| (i + 1, line.len() - trimmed.len() + 1))
    })
}
