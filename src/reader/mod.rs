pub mod error;
pub mod fallback_store;
pub mod native_store;
pub mod scan;
pub mod sparse_index;

pub use error::StoreError;
pub use fallback_store::FallbackStore;
pub use native_store::NativeStore;

use serde::Deserialize;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Default sparse index interval (index every 10,000 lines)
pub const DEFAULT_INDEX_INTERVAL: usize = 10_000;

/// Opaque modification token captured from file metadata.
///
/// Only equality is meaningful. Two writes that land within one filesystem
/// timestamp tick produce equal stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModifiedStamp(SystemTime);

impl ModifiedStamp {
    fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        metadata.modified().map(Self)
    }

    /// Probe the current stamp of `path` without opening it.
    pub fn of_path(path: &Path) -> io::Result<Self> {
        Self::from_metadata(&fs::metadata(path)?)
    }
}

/// Cached view of a file as of its last synchronization.
///
/// The fields are always replaced together so readers never see a line
/// count paired with a stamp from a different scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    pub line_count: usize,
    pub modified: ModifiedStamp,
    /// Bytes covered by the scan that produced `line_count`
    pub file_size: u64,
}

/// Line-addressable access to one file.
///
/// Implementations must be interchangeable: callers can only tell backends
/// apart by performance.
pub trait LineStore: Send + Sync {
    /// Path this store was opened with
    fn path(&self) -> &Path;

    /// Snapshot of the last synchronization
    fn sync_state(&self) -> SyncState;

    /// Read up to `count` lines starting at `start`.
    ///
    /// Never reads past the last synchronized line count. Returns a shorter
    /// (possibly empty) sequence at end of file.
    fn read_lines(&self, start: usize, count: usize) -> Result<Vec<String>, StoreError>;

    /// Re-derive the line count and stamp with a full scan.
    ///
    /// On failure the previous state is left untouched.
    fn resynchronize(&self) -> Result<(), StoreError>;

    /// Last synchronized line count (no filesystem access)
    fn line_count(&self) -> usize {
        self.sync_state().line_count
    }

    fn modified(&self) -> ModifiedStamp {
        self.sync_state().modified
    }

    fn file_size(&self) -> u64 {
        self.sync_state().file_size
    }

    /// Metadata check only. A file whose metadata cannot be read counts as changed.
    fn has_changed(&self) -> bool {
        match ModifiedStamp::of_path(self.path()) {
            Ok(stamp) => stamp != self.modified(),
            Err(_) => true,
        }
    }
}

/// Which line store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// memchr scanning with a sparse line index
    #[default]
    Native,
    /// Plain buffered reads, no index
    Fallback,
}

/// Backend selection made once by the host, used for every store it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub backend: Backend,
    pub index_interval: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            backend: Backend::Native,
            index_interval: DEFAULT_INDEX_INTERVAL,
        }
    }
}

impl StoreOptions {
    pub fn fallback() -> Self {
        Self {
            backend: Backend::Fallback,
            ..Self::default()
        }
    }

    /// Open a store with the configured backend.
    pub fn open(&self, path: &Path) -> Result<Arc<dyn LineStore>, StoreError> {
        Ok(match self.backend {
            Backend::Native => Arc::new(NativeStore::with_interval(path, self.index_interval)?),
            Backend::Fallback => Arc::new(FallbackStore::new(path)?),
        })
    }

    /// Like [`open`](Self::open), but retries with the fallback backend when
    /// the native one fails for a reason other than the file itself.
    pub fn open_or_fallback(&self, path: &Path) -> Result<Arc<dyn LineStore>, StoreError> {
        match self.open(path) {
            Err(StoreError::Io { source, .. }) if self.backend == Backend::Native => {
                tracing::warn!(
                    path = %path.display(),
                    error = %source,
                    "native line store unavailable, using fallback"
                );
                Ok(Arc::new(FallbackStore::new(path)?))
            }
            other => other,
        }
    }
}

/// Open `path` for reading and capture its metadata from the handle.
///
/// Metadata is taken before any content is read: bytes appended during the
/// scan leave the stamp stale, so the next check reports a change.
pub(crate) fn open_regular(path: &Path) -> io::Result<(File, ModifiedStamp)> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    if metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path is a directory",
        ));
    }
    let stamp = ModifiedStamp::from_metadata(&metadata)?;
    Ok((file, stamp))
}

/// Map an initial open failure, keeping directories distinct.
pub(crate) fn open_error(path: &Path, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::InvalidInput || path.is_dir() {
        StoreError::NotAFile {
            path: path.to_path_buf(),
        }
    } else {
        StoreError::on_open(path, err)
    }
}

/// Strip the record terminator (`\n` or `\r\n`) and decode lossily.
pub(crate) fn decode_line(mut raw: &[u8]) -> String {
    if let Some(rest) = raw.strip_suffix(b"\n") {
        raw = rest.strip_suffix(b"\r").unwrap_or(rest);
    }
    String::from_utf8_lossy(raw).into_owned()
}

/// Recover a lock guard even if a writer panicked: the guarded value is
/// only ever replaced whole, never left half-written.
pub(crate) fn unpoison<G>(res: Result<G, std::sync::PoisonError<G>>) -> G {
    res.unwrap_or_else(std::sync::PoisonError::into_inner)
}
