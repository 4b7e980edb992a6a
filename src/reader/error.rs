//! Error types for line stores.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure opening, reading or resynchronizing a line store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The path did not exist when the store was opened.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file exists but cannot be read.
    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// The path exists but is not a regular file (e.g. a directory).
    #[error("not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    /// Open or read failed after the file had been accessible.
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classify an error raised while opening a file for the first time.
    pub(crate) fn on_open(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound { path },
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied { path },
            _ => StoreError::Io { path, source },
        }
    }

    /// Wrap an error raised after the store was established.
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the failure means the file no longer exists.
    pub fn is_gone(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            StoreError::NotFound { path }
            | StoreError::PermissionDenied { path }
            | StoreError::NotAFile { path }
            | StoreError::Io { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_open_maps_kinds() {
        let p = Path::new("/tmp/x.log");
        assert!(matches!(
            StoreError::on_open(p, io::Error::from(io::ErrorKind::NotFound)),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            StoreError::on_open(p, io::Error::from(io::ErrorKind::PermissionDenied)),
            StoreError::PermissionDenied { .. }
        ));
        assert!(matches!(
            StoreError::on_open(p, io::Error::from(io::ErrorKind::InvalidData)),
            StoreError::Io { .. }
        ));
    }

    #[test]
    fn test_is_gone() {
        let p = Path::new("/tmp/x.log");
        assert!(StoreError::io(p, io::Error::from(io::ErrorKind::NotFound)).is_gone());
        assert!(!StoreError::io(p, io::Error::from(io::ErrorKind::Interrupted)).is_gone());
        assert!(!StoreError::PermissionDenied {
            path: p.to_path_buf()
        }
        .is_gone());
    }

    #[test]
    fn test_display_includes_path() {
        let err = StoreError::NotFound {
            path: PathBuf::from("/var/log/app.log"),
        };
        assert_eq!(err.to_string(), "file not found: /var/log/app.log");
        assert_eq!(err.path(), Path::new("/var/log/app.log"));
    }
}
