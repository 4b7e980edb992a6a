//! Change detection for watched files and directories.
//!
//! `notify` delivers raw events on its own thread. They are forwarded over a
//! channel to a debounce worker, which scopes them to the registered roots,
//! collapses modification bursts and hands `DomainEvent`s to the single
//! consumer through another channel.

pub mod classify;
pub mod debounce;
pub mod roots;

use classify::classify;
use debounce::Debouncer;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use roots::{Install, RootKind, RootTable};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::reader::unpoison;

/// Default debounce window for modification bursts
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Normalized filesystem change for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl DomainEvent {
    pub fn path(&self) -> &Path {
        match self {
            DomainEvent::Created(p) | DomainEvent::Modified(p) | DomainEvent::Deleted(p) => p,
        }
    }
}

/// Failure to establish OS change notification
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch for `path` could not be installed; the root is not watched.
    #[error("cannot watch {}: {source}", path.display())]
    SetupFailure {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The platform notification backend could not be created at all.
    #[error("file notification backend unavailable: {0}")]
    Backend(#[source] notify::Error),
}

/// Messages to the debounce worker
enum Control {
    Raw(notify::Result<Event>),
    Shutdown,
}

/// Watches a set of roots and emits debounced domain events.
///
/// Owns the OS watch handles: they are released on `unwatch` and when the
/// detector is dropped.
pub struct ChangeDetector {
    watcher: RecommendedWatcher,
    roots: Arc<RwLock<RootTable>>,
    control: Sender<Control>,
    worker: Option<JoinHandle<()>>,
}

impl ChangeDetector {
    /// Start the notification backend and the debounce worker.
    ///
    /// Returns the detector and the receiving end of its event stream.
    pub fn start(debounce: Duration) -> Result<(Self, Receiver<DomainEvent>), WatchError> {
        let (control_tx, control_rx) = channel();
        let (event_tx, event_rx) = channel();

        let raw_tx = control_tx.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.send(Control::Raw(res));
        })
        .map_err(WatchError::Backend)?;

        let roots = Arc::new(RwLock::new(RootTable::new()));
        let worker = {
            let roots = Arc::clone(&roots);
            thread::Builder::new()
                .name("linewatch-debounce".into())
                .spawn(move || run_worker(control_rx, event_tx, roots, debounce))
                .map_err(|e| WatchError::Backend(notify::Error::io(e)))?
        };

        Ok((
            Self {
                watcher,
                roots,
                control: control_tx,
                worker: Some(worker),
            },
            event_rx,
        ))
    }

    /// Register `root` for monitoring. Idempotent for an already-watched root.
    ///
    /// Directories report files appearing and disappearing directly inside
    /// them, or anywhere below when `recursive` is set. `recursive` is
    /// ignored for file roots.
    pub fn watch(&mut self, root: &Path, recursive: bool) -> Result<(), WatchError> {
        let setup_failure = |source: notify::Error| WatchError::SetupFailure {
            path: root.to_path_buf(),
            source,
        };

        let metadata = std::fs::metadata(root)
            .map_err(|e| setup_failure(notify::Error::io(e).add_path(root.to_path_buf())))?;
        let kind = if metadata.is_dir() {
            RootKind::Directory { recursive }
        } else {
            RootKind::File
        };

        let mut table = unpoison(self.roots.write());
        match table.get(root) {
            Some(existing) if existing == kind => return Ok(()),
            Some(_) => {
                if let Some(dir) = table.remove(root) {
                    let _ = self.watcher.unwatch(&dir);
                }
            }
            None => {}
        }

        match table.plan(root, kind) {
            Install::Covered => {}
            Install::New { dir, recursive } => {
                self.watcher
                    .watch(&dir, recursive_mode(recursive))
                    .map_err(setup_failure)?;
                tracing::debug!(dir = %dir.display(), recursive, "installed OS watch");
            }
            Install::Upgrade { dir } => {
                let _ = self.watcher.unwatch(&dir);
                if let Err(e) = self.watcher.watch(&dir, RecursiveMode::Recursive) {
                    // Keep existing users served
                    let _ = self.watcher.watch(&dir, RecursiveMode::NonRecursive);
                    return Err(setup_failure(e));
                }
                tracing::debug!(dir = %dir.display(), "upgraded OS watch to recursive");
            }
        }

        table.insert(root.to_path_buf(), kind);
        tracing::info!(root = %root.display(), ?kind, "watching");
        Ok(())
    }

    /// Stop monitoring `root`. No-op if it is not watched.
    pub fn unwatch(&mut self, root: &Path) {
        let mut table = unpoison(self.roots.write());
        if table.get(root).is_none() {
            return;
        }
        if let Some(dir) = table.remove(root) {
            if let Err(e) = self.watcher.unwatch(&dir) {
                tracing::debug!(dir = %dir.display(), error = %e, "OS unwatch failed");
            }
        }
        tracing::info!(root = %root.display(), "stopped watching");
    }

    pub fn is_watched(&self, root: &Path) -> bool {
        unpoison(self.roots.read()).get(root).is_some()
    }

    /// Stop the worker after flushing pending events. Equivalent to dropping.
    pub fn shutdown(self) {}
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn recursive_mode(recursive: bool) -> RecursiveMode {
    if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    }
}

/// Debounce loop: runs until shutdown or until the consumer goes away.
fn run_worker(
    control: Receiver<Control>,
    events: Sender<DomainEvent>,
    roots: Arc<RwLock<RootTable>>,
    window: Duration,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let msg = match debouncer.next_deadline() {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match control.recv_timeout(timeout) {
                    Ok(msg) => Some(msg),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match control.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            },
        };

        let now = Instant::now();
        let mut ready = Vec::new();
        match msg {
            Some(Control::Raw(Ok(event))) => {
                let table = unpoison(roots.read());
                for domain in classify(&event) {
                    if table.in_scope(domain.path()) {
                        ready.extend(debouncer.push(domain, now));
                    }
                }
            }
            Some(Control::Raw(Err(e))) => {
                tracing::warn!(error = %e, paths = ?e.paths, "file notification error");
            }
            Some(Control::Shutdown) => break,
            None => {}
        }
        ready.extend(debouncer.drain_due(now));

        for event in ready {
            tracing::trace!(?event, "emit");
            if events.send(event).is_err() {
                return;
            }
        }
    }

    for event in debouncer.drain_all() {
        let _ = events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(30);

    /// Poll for the next event for `path`, skipping events for other paths
    fn poll_for(rx: &Receiver<DomainEvent>, path: &Path, max_wait: Duration) -> Option<DomainEvent> {
        let deadline = Instant::now() + max_wait;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) if event.path() == path => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    }

    fn canonical_tempdir() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        (temp, root)
    }

    #[test]
    fn test_watch_missing_path_fails() {
        let (mut detector, _rx) = ChangeDetector::start(SHORT).unwrap();
        let result = detector.watch(Path::new("/path/that/definitely/does/not/exist.log"), false);
        assert!(matches!(result, Err(WatchError::SetupFailure { .. })));
        assert!(!detector.is_watched(Path::new("/path/that/definitely/does/not/exist.log")));
    }

    #[test]
    fn test_watch_is_idempotent_and_unwatch_is_silent() {
        let (_temp, root) = canonical_tempdir();
        let file = root.join("a.log");
        fs::write(&file, "x\n").unwrap();

        let (mut detector, _rx) = ChangeDetector::start(SHORT).unwrap();
        detector.watch(&file, false).unwrap();
        detector.watch(&file, false).unwrap();
        assert!(detector.is_watched(&file));

        detector.unwatch(&file);
        assert!(!detector.is_watched(&file));
        detector.unwatch(&file);
        detector.unwatch(Path::new("/never/watched"));
    }

    #[test]
    fn test_failed_root_does_not_affect_siblings() {
        let (_temp, root) = canonical_tempdir();
        let (mut detector, _rx) = ChangeDetector::start(SHORT).unwrap();

        assert!(detector.watch(&root.join("missing"), false).is_err());
        detector.watch(&root, false).unwrap();
        assert!(detector.is_watched(&root));
    }

    #[test]
    fn test_shutdown_closes_stream() {
        let (detector, rx) = ChangeDetector::start(SHORT).unwrap();
        detector.shutdown();
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_err());
    }

    // === SLOW TESTS (marked with #[ignore]) ===
    // These depend on OS notification latency.

    #[test]
    #[ignore]
    fn test_detects_modification_of_watched_file() {
        let (_temp, root) = canonical_tempdir();
        let file = root.join("app.log");
        fs::write(&file, "first\n").unwrap();

        let (mut detector, rx) = ChangeDetector::start(SHORT).unwrap();
        detector.watch(&file, false).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut f = OpenOptions::new().append(true).open(&file).unwrap();
        writeln!(f, "second").unwrap();
        drop(f);

        let event = poll_for(&rx, &file, Duration::from_secs(2));
        assert_eq!(event, Some(DomainEvent::Modified(file)));
    }

    #[test]
    #[ignore]
    fn test_burst_is_debounced() {
        let (_temp, root) = canonical_tempdir();
        let file = root.join("burst.log");
        fs::write(&file, "").unwrap();

        let (mut detector, rx) = ChangeDetector::start(Duration::from_millis(300)).unwrap();
        detector.watch(&file, false).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut f = OpenOptions::new().append(true).open(&file).unwrap();
        for i in 0..100 {
            writeln!(f, "line {}", i).unwrap();
        }
        drop(f);

        assert_eq!(
            poll_for(&rx, &file, Duration::from_secs(2)),
            Some(DomainEvent::Modified(file.clone()))
        );
        // The whole burst fit in one window
        assert_eq!(poll_for(&rx, &file, Duration::from_millis(200)), None);
    }

    #[test]
    #[ignore]
    fn test_directory_created_and_deleted() {
        let (_temp, root) = canonical_tempdir();
        let (mut detector, rx) = ChangeDetector::start(SHORT).unwrap();
        detector.watch(&root, false).unwrap();
        thread::sleep(Duration::from_millis(50));

        let file = root.join("x.log");
        fs::write(&file, "hello\n").unwrap();
        assert_eq!(
            poll_for(&rx, &file, Duration::from_secs(2)),
            Some(DomainEvent::Created(file.clone()))
        );

        thread::sleep(Duration::from_millis(100));
        while rx.try_recv().is_ok() {}

        fs::remove_file(&file).unwrap();
        assert_eq!(
            poll_for(&rx, &file, Duration::from_secs(2)),
            Some(DomainEvent::Deleted(file))
        );
    }

    #[test]
    #[ignore]
    fn test_non_recursive_ignores_subdirectories() {
        let (_temp, root) = canonical_tempdir();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();

        let (mut detector, rx) = ChangeDetector::start(SHORT).unwrap();
        detector.watch(&root, false).unwrap();
        thread::sleep(Duration::from_millis(50));

        let nested = sub.join("nested.log");
        fs::write(&nested, "x\n").unwrap();
        assert_eq!(poll_for(&rx, &nested, Duration::from_millis(300)), None);
    }

    #[test]
    #[ignore]
    fn test_recursive_reports_nested_files() {
        let (_temp, root) = canonical_tempdir();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();

        let (mut detector, rx) = ChangeDetector::start(SHORT).unwrap();
        detector.watch(&root, true).unwrap();
        thread::sleep(Duration::from_millis(50));

        let nested = sub.join("nested.log");
        fs::write(&nested, "x\n").unwrap();
        assert_eq!(
            poll_for(&rx, &nested, Duration::from_secs(2)),
            Some(DomainEvent::Created(nested))
        );
    }

    #[test]
    #[ignore]
    fn test_unwatched_file_goes_quiet() {
        let (_temp, root) = canonical_tempdir();
        let file = root.join("quiet.log");
        fs::write(&file, "x\n").unwrap();

        let (mut detector, rx) = ChangeDetector::start(SHORT).unwrap();
        detector.watch(&file, false).unwrap();
        detector.unwatch(&file);
        thread::sleep(Duration::from_millis(50));

        fs::write(&file, "y\n").unwrap();
        assert_eq!(poll_for(&rx, &file, Duration::from_millis(300)), None);
    }
}
