use super::scan::{count_lines, skip_lines, take_lines};
use super::sparse_index::SparseIndex;
use super::{open_error, open_regular, unpoison, LineStore, StoreError, SyncState};
use super::DEFAULT_INDEX_INTERVAL;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// Buffer size for positioned reads
const READ_BUFFER: usize = 64 * 1024;

/// State produced by one full scan. Replaced whole on resync.
#[derive(Debug)]
struct Snapshot {
    state: SyncState,
    index: SparseIndex,
}

/// Line store backed by memchr scanning and a sparse line index.
///
/// The counting pass records the byte offset of every `interval`-th line, so
/// `read_lines` seeks close to the requested window instead of skipping from
/// the start of the file. The file is reopened on every read, so a deleted
/// file surfaces as an I/O failure instead of stale content.
pub struct NativeStore {
    path: PathBuf,
    interval: usize,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serializes resyncs so an older scan never overwrites a newer one
    resync: Mutex<()>,
}

impl NativeStore {
    /// Open `path` and build the index with the default interval
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_interval(path, DEFAULT_INDEX_INTERVAL)
    }

    /// Open `path` and build the index with a custom interval
    pub fn with_interval<P: AsRef<Path>>(path: P, interval: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let interval = interval.max(1);
        let snapshot = Self::scan(&path, interval).map_err(|e| open_error(&path, e))?;

        tracing::debug!(
            path = %path.display(),
            lines = snapshot.state.line_count,
            index_entries = snapshot.index.entry_count(),
            "opened native line store"
        );

        Ok(Self {
            path,
            interval,
            snapshot: RwLock::new(Arc::new(snapshot)),
            resync: Mutex::new(()),
        })
    }

    fn scan(path: &Path, interval: usize) -> std::io::Result<Snapshot> {
        let (file, modified) = open_regular(path)?;
        let mut index = SparseIndex::new(interval);
        let result = count_lines(file, interval, |line, offset| index.append(line, offset))?;

        Ok(Snapshot {
            state: SyncState {
                line_count: result.line_count,
                modified,
                file_size: result.bytes,
            },
            index,
        })
    }

    fn current(&self) -> Arc<Snapshot> {
        let guard = unpoison(self.snapshot.read());
        Arc::clone(&guard)
    }

    #[cfg(test)]
    fn index_entries(&self) -> usize {
        self.current().index.entry_count()
    }
}

impl LineStore for NativeStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn sync_state(&self) -> SyncState {
        self.current().state
    }

    fn read_lines(&self, start: usize, count: usize) -> Result<Vec<String>, StoreError> {
        let snapshot = self.current();
        let available = snapshot.state.line_count.saturating_sub(start);
        let count = count.min(available);

        // Open even when nothing is requested so a vanished file is reported
        let file = File::open(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let len = file
            .metadata()
            .map_err(|e| StoreError::io(&self.path, e))?
            .len();
        let mut reader = BufReader::with_capacity(READ_BUFFER, file);
        let (offset, skip) = snapshot.index.locate(start);
        let (offset, skip) = if offset == 0 {
            (0, skip)
        } else if len >= snapshot.state.file_size
            && follows_newline(&mut reader, offset).map_err(|e| StoreError::io(&self.path, e))?
        {
            (offset, skip)
        } else {
            // Rewritten since the last sync; index offsets no longer mark lines
            (0, start)
        };
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::io(&self.path, e))?;

        let read = skip_lines(&mut reader, skip)
            .and_then(|_| take_lines(&mut reader, count))
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(read)
    }

    fn resynchronize(&self) -> Result<(), StoreError> {
        let _guard = unpoison(self.resync.lock());
        let snapshot = Self::scan(&self.path, self.interval).map_err(|e| StoreError::io(&self.path, e))?;

        tracing::debug!(
            path = %self.path.display(),
            lines = snapshot.state.line_count,
            "resynchronized native line store"
        );

        *unpoison(self.snapshot.write()) = Arc::new(snapshot);
        Ok(())
    }
}

/// Whether the byte just before `offset` is a record terminator.
fn follows_newline<R: Read + Seek>(reader: &mut R, offset: u64) -> std::io::Result<bool> {
    reader.seek(SeekFrom::Start(offset - 1))?;
    let mut byte = [0u8; 1];
    match reader.read_exact(&mut byte) {
        Ok(()) => Ok(byte[0] == b'\n'),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::test_support::bump_mtime;
    use anyhow::Result;
    use std::io::Write;
    use std::thread;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_scenario_terminated_lines() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"a\nb\nc\n")?;
        temp_file.flush()?;

        let store = NativeStore::new(temp_file.path())?;
        assert_eq!(store.line_count(), 3);
        assert_eq!(store.read_lines(1, 2)?, vec!["b", "c"]);
        Ok(())
    }

    #[test]
    fn test_scenario_unterminated_last_line() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"a\nb")?;
        temp_file.flush()?;

        let store = NativeStore::new(temp_file.path())?;
        assert_eq!(store.line_count(), 2);
        assert_eq!(store.read_lines(0, 5)?, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_empty_file() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let store = NativeStore::new(temp_file.path())?;

        assert_eq!(store.line_count(), 0);
        assert_eq!(store.file_size(), 0);
        assert!(store.read_lines(0, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_reads_through_index() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        for i in 0..1000 {
            writeln!(temp_file, "Line number {}", i)?;
        }
        temp_file.flush()?;

        let store = NativeStore::with_interval(temp_file.path(), 64)?;
        assert_eq!(store.line_count(), 1000);
        assert_eq!(store.index_entries(), 1000 / 64);

        assert_eq!(store.read_lines(0, 1)?, vec!["Line number 0"]);
        assert_eq!(store.read_lines(63, 2)?, vec!["Line number 63", "Line number 64"]);
        assert_eq!(store.read_lines(640, 1)?, vec!["Line number 640"]);
        assert_eq!(
            store.read_lines(997, 10)?,
            vec!["Line number 997", "Line number 998", "Line number 999"]
        );
        assert!(store.read_lines(1000, 1)?.is_empty());
        assert!(store.read_lines(usize::MAX, 1)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_reads_capped_at_synced_count() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "first")?;
        temp_file.flush()?;

        let store = NativeStore::new(temp_file.path())?;
        writeln!(temp_file, "second")?;
        temp_file.flush()?;

        // Appended content is invisible until resync
        assert_eq!(store.read_lines(0, 10)?, vec!["first"]);
        store.resynchronize()?;
        assert_eq!(store.read_lines(0, 10)?, vec!["first", "second"]);
        Ok(())
    }

    #[test]
    fn test_resync_after_truncation() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let path = temp_file.path().to_path_buf();
        std::fs::write(&path, "Line 1\nLine 2\nLine 3\nLine 4\n")?;

        let store = NativeStore::with_interval(&path, 2)?;
        assert_eq!(store.line_count(), 4);

        std::fs::write(&path, "New 1\nNew 2\n")?;
        bump_mtime(&path, 3);
        assert!(store.has_changed());

        store.resynchronize()?;
        assert_eq!(store.line_count(), 2);
        assert_eq!(store.read_lines(0, 10)?, vec!["New 1", "New 2"]);
        assert!(!store.has_changed());
        Ok(())
    }

    #[test]
    fn test_read_shrunk_file_is_short_not_error() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let path = temp_file.path().to_path_buf();
        std::fs::write(&path, "1\n2\n3\n4\n5\n6\n")?;

        let store = NativeStore::with_interval(&path, 2)?;
        std::fs::write(&path, "1\n")?;

        // Index offsets now point past EOF: a short read, not a failure
        assert!(store.read_lines(4, 2)?.is_empty());
        assert_eq!(store.read_lines(0, 6)?, vec!["1"]);
        Ok(())
    }

    #[test]
    fn test_resync_idempotent() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "x")?;
        writeln!(temp_file, "y")?;
        temp_file.flush()?;

        let store = NativeStore::new(temp_file.path())?;
        store.resynchronize()?;
        let first = store.sync_state();
        store.resynchronize()?;
        assert_eq!(store.sync_state(), first);
        Ok(())
    }

    #[test]
    fn test_failed_resync_keeps_state() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("app.log");
        std::fs::write(&path, "a\nb\n")?;

        let store = NativeStore::new(&path)?;
        let before = store.sync_state();
        std::fs::remove_file(&path)?;

        let err = store.resynchronize().unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(err.is_gone());
        assert_eq!(store.sync_state(), before);
        Ok(())
    }

    #[test]
    fn test_read_after_delete_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("app.log");
        std::fs::write(&path, "a\nb\n")?;

        let store = NativeStore::new(&path)?;
        std::fs::remove_file(&path)?;

        assert!(matches!(store.read_lines(0, 2), Err(StoreError::Io { .. })));
        assert!(matches!(store.read_lines(5, 0), Err(StoreError::Io { .. })));
        Ok(())
    }

    #[test]
    fn test_concurrent_read_and_resync() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let path = temp_file.path().to_path_buf();
        let body: String = (0..200).map(|i| format!("row {}\n", i)).collect();
        std::fs::write(&path, &body)?;

        let store = Arc::new(NativeStore::with_interval(&path, 16)?);

        let writer = {
            let path = path.clone();
            thread::spawn(move || {
                let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
                for i in 200..400 {
                    writeln!(file, "row {}", i).unwrap();
                }
            })
        };

        let resyncer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..50 {
                    store.resynchronize().unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let state = store.sync_state();
                        assert!(state.line_count >= 200);
                        let lines = store.read_lines(0, state.line_count).unwrap();
                        // Never more than the count of the snapshot in effect
                        assert!(lines.len() <= store.line_count().max(state.line_count));
                        assert_eq!(lines[0], "row 0");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        resyncer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }

        store.resynchronize()?;
        assert_eq!(store.line_count(), 400);
        Ok(())
    }
}
