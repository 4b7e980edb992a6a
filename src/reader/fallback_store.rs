use super::scan::take_lines;
use super::{open_error, open_regular, unpoison, LineStore, StoreError, SyncState};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// Line store using only buffered sequential reads.
///
/// Keeps no index: every `read_lines` call skips from the start of the file.
/// This is the portable reference behavior the native store must match.
pub struct FallbackStore {
    path: PathBuf,
    state: RwLock<SyncState>,
    resync: Mutex<()>,
}

impl FallbackStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = Self::scan(&path).map_err(|e| open_error(&path, e))?;

        tracing::debug!(
            path = %path.display(),
            lines = state.line_count,
            "opened fallback line store"
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
            resync: Mutex::new(()),
        })
    }

    fn scan(path: &Path) -> io::Result<SyncState> {
        let (file, modified) = open_regular(path)?;
        let mut reader = BufReader::new(file);
        let mut line_count = 0usize;
        let mut file_size = 0u64;
        let mut record = Vec::new();

        loop {
            record.clear();
            let n = reader.read_until(b'\n', &mut record)?;
            if n == 0 {
                break;
            }
            line_count += 1;
            file_size += n as u64;
        }

        Ok(SyncState {
            line_count,
            modified,
            file_size,
        })
    }
}

impl LineStore for FallbackStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn sync_state(&self) -> SyncState {
        *unpoison(self.state.read())
    }

    fn read_lines(&self, start: usize, count: usize) -> Result<Vec<String>, StoreError> {
        let count = count.min(self.line_count().saturating_sub(start));
        let file = File::open(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut reader = BufReader::new(file);
        let mut scratch = Vec::new();
        for _ in 0..start {
            scratch.clear();
            let n = reader
                .read_until(b'\n', &mut scratch)
                .map_err(|e| StoreError::io(&self.path, e))?;
            if n == 0 {
                return Ok(Vec::new());
            }
        }

        take_lines(&mut reader, count).map_err(|e| StoreError::io(&self.path, e))
    }

    fn resynchronize(&self) -> Result<(), StoreError> {
        let _guard = unpoison(self.resync.lock());
        let state = Self::scan(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        *unpoison(self.state.write()) = state;
        Ok(())
    }
}
