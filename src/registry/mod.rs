//! Session registry: binds open views (sessions) to line stores and turns
//! domain events into session notifications.
//!
//! Per tracked path the lifecycle is:
//!
//! ```text
//! UNTRACKED --(open_file | Created in watched dir)--> ACTIVE
//! ACTIVE --(Modified)--> ACTIVE     resync; ContentChanged or TransientError
//! ACTIVE --(Deleted | resync finds file gone)--> REMOVED (FileDeleted)
//! ACTIVE --(close_session of last view)--> REMOVED (UserClosed)
//! ```
//!
//! One line store exists per canonical path; several sessions may share it.

pub mod filter;

pub use filter::FileFilter;

use crate::event::{CloseReason, Notification, SessionId};
use crate::reader::{LineStore, StoreError, StoreOptions};
use crate::watcher::{ChangeDetector, DomainEvent, WatchError, DEFAULT_DEBOUNCE};
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Registry settings chosen once by the host
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub store: StoreOptions,
    pub debounce: Duration,
    pub filter: FileFilter,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            store: StoreOptions::default(),
            debounce: DEFAULT_DEBOUNCE,
            filter: FileFilter::default(),
        }
    }
}

/// A path with a live line store and the sessions viewing it
struct Tracked {
    store: Arc<dyn LineStore>,
    sessions: BTreeSet<SessionId>,
}

pub struct SessionRegistry {
    options: RegistryOptions,
    detector: ChangeDetector,
    events: Receiver<DomainEvent>,
    observer: Sender<Notification>,
    sessions: HashMap<SessionId, PathBuf>,
    tracked: HashMap<PathBuf, Tracked>,
    /// Directory roots used for discovery, with their recursion flag
    directories: HashMap<PathBuf, bool>,
    /// Sessions closed because their file was deleted, until the host closes them
    deleted: HashMap<SessionId, PathBuf>,
    next_id: u64,
}

impl SessionRegistry {
    /// Create a registry with its own change detector.
    ///
    /// Returns the registry and the observer's notification stream.
    pub fn new(options: RegistryOptions) -> Result<(Self, Receiver<Notification>), RegistryError> {
        let (detector, events) = ChangeDetector::start(options.debounce)?;
        let (observer, notifications) = channel();
        Ok((
            Self {
                options,
                detector,
                events,
                observer,
                sessions: HashMap::new(),
                tracked: HashMap::new(),
                directories: HashMap::new(),
                deleted: HashMap::new(),
                next_id: 1,
            },
            notifications,
        ))
    }

    /// Open a session for a single file.
    ///
    /// A path that is already tracked gets a new session sharing its store.
    pub fn open_file(&mut self, path: &Path) -> Result<SessionId, RegistryError> {
        let path = canonical(path)?;
        if self.tracked.contains_key(&path) {
            return Ok(self.attach_session(&path));
        }

        let unwatched = self.track(&path)?;
        let id = self.attach_session(&path);
        if let Some(e) = unwatched {
            self.emit(Notification::TransientError {
                id,
                description: e.to_string(),
            });
        }
        Ok(id)
    }

    /// Watch a directory and open a session per matching file in it.
    ///
    /// Files already tracked contribute their existing session instead of a
    /// new one. Files appearing later are announced with `SessionOpened`.
    pub fn open_directory(
        &mut self,
        path: &Path,
        recursive: bool,
    ) -> Result<Vec<SessionId>, RegistryError> {
        let dir = canonical(path)?;
        if !dir.is_dir() {
            return Err(RegistryError::NotADirectory(dir));
        }

        // Watch before listing so files created in between are not missed
        self.detector.watch(&dir, recursive)?;
        self.directories.insert(dir.clone(), recursive);

        let max_depth = if recursive { usize::MAX } else { 1 };
        let candidates: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && self.options.filter.matches(e.path()))
            .map(|e| e.into_path())
            .collect();

        let mut ids = Vec::with_capacity(candidates.len());
        for file in candidates {
            if let Some(existing) = self.tracked.get(&file).and_then(|t| t.sessions.first()) {
                ids.push(*existing);
                continue;
            }
            match self.track(&file) {
                Ok(_) => ids.push(self.attach_session(&file)),
                Err(e) => tracing::warn!(path = %file.display(), error = %e, "cannot open discovered file"),
            }
        }

        tracing::info!(dir = %dir.display(), recursive, sessions = ids.len(), "opened directory");
        Ok(ids)
    }

    /// Stop discovering new files in `path`. Sessions already opened from it
    /// stay open and keep receiving changes.
    pub fn close_directory(&mut self, path: &Path) {
        let dir = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.directories.remove(&dir).is_some() {
            self.detector.unwatch(&dir);
        }
    }

    /// Close one session. The store is released when no session uses it.
    pub fn close_session(&mut self, id: SessionId) -> Result<(), RegistryError> {
        // Already closed by deletion; forget it without a second notification
        if self.deleted.remove(&id).is_some() {
            return Ok(());
        }
        let path = self
            .sessions
            .remove(&id)
            .ok_or(RegistryError::UnknownSession(id))?;

        let now_unused = match self.tracked.get_mut(&path) {
            Some(tracked) => {
                tracked.sessions.remove(&id);
                tracked.sessions.is_empty()
            }
            None => false,
        };
        if now_unused {
            self.untrack(&path);
        }

        self.emit(Notification::SessionClosed {
            id,
            reason: CloseReason::UserClosed,
        });
        Ok(())
    }

    /// Shared handle to the store behind a session.
    ///
    /// The handle outlives the session; once the file is gone its reads fail
    /// with an I/O error rather than returning stale content.
    pub fn store(&self, id: SessionId) -> Option<Arc<dyn LineStore>> {
        let path = self.sessions.get(&id)?;
        self.tracked.get(path).map(|t| Arc::clone(&t.store))
    }

    /// Read `count` lines from `start` in the session's file.
    ///
    /// A session closed because its file was deleted keeps failing with a
    /// "not found" [`StoreError`] until [`close_session`](Self::close_session)
    /// is called for it; ids never issued are `UnknownSession`.
    pub fn read_lines(
        &self,
        id: SessionId,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, RegistryError> {
        if let Some(path) = self.deleted.get(&id) {
            return Err(StoreError::io(path, io::ErrorKind::NotFound.into()).into());
        }
        let store = self.store(id).ok_or(RegistryError::UnknownSession(id))?;
        Ok(store.read_lines(start, count)?)
    }

    pub fn line_count(&self, id: SessionId) -> Result<usize, RegistryError> {
        self.store(id)
            .map(|s| s.line_count())
            .ok_or(RegistryError::UnknownSession(id))
    }

    pub fn path(&self, id: SessionId) -> Option<&Path> {
        self.sessions.get(&id).map(PathBuf::as_path)
    }

    /// Open sessions, ordered by id
    pub fn sessions(&self) -> Vec<(SessionId, &Path)> {
        let mut all: Vec<_> = self
            .sessions
            .iter()
            .map(|(id, p)| (*id, p.as_path()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.detector.is_watched(path)
    }

    /// Apply one domain event.
    pub fn handle_event(&mut self, event: DomainEvent) {
        tracing::debug!(?event, "domain event");
        match event {
            DomainEvent::Modified(path) => self.resynchronize(&path),
            DomainEvent::Created(path) => {
                if self.tracked.contains_key(&path) {
                    // Replaced under the same name
                    self.resynchronize(&path);
                } else if self.discovers(&path) {
                    match self.track(&path) {
                        Ok(_) => {
                            self.attach_session(&path);
                        }
                        Err(e) if e.is_gone() => {
                            tracing::debug!(path = %path.display(), "created file vanished before open");
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "cannot open created file");
                        }
                    }
                }
            }
            DomainEvent::Deleted(path) => {
                if self.tracked.contains_key(&path) {
                    self.remove_deleted(&path);
                }
            }
        }
    }

    /// Apply every event already queued. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one event and apply it.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Probe every tracked file and resynchronize those that changed.
    ///
    /// Covers filesystems where notifications are unreliable. Returns the
    /// number of files that were found changed.
    pub fn poll_changes(&mut self) -> usize {
        let stale: Vec<PathBuf> = self
            .tracked
            .iter()
            .filter(|(_, t)| t.store.has_changed())
            .map(|(p, _)| p.clone())
            .collect();
        for path in &stale {
            self.resynchronize(path);
        }
        stale.len()
    }

    /// Release all watches and stop the detector
    pub fn shutdown(self) {
        self.detector.shutdown();
    }

    /// Open a store for `path` and watch it. A watch failure does not fail
    /// the open; it is handed back so the caller can report it.
    fn track(&mut self, path: &Path) -> Result<Option<WatchError>, StoreError> {
        let store = self.options.store.open_or_fallback(path)?;
        self.tracked.insert(
            path.to_path_buf(),
            Tracked {
                store,
                sessions: BTreeSet::new(),
            },
        );

        match self.detector.watch(path, false) {
            Ok(()) => Ok(None),
            Err(e) => {
                // Still viewable; changes are picked up by poll_changes
                tracing::warn!(path = %path.display(), error = %e, "file opened without change notification");
                Ok(Some(e))
            }
        }
    }

    fn untrack(&mut self, path: &Path) {
        if self.tracked.remove(path).is_some() {
            self.detector.unwatch(path);
        }
    }

    fn attach_session(&mut self, path: &Path) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;

        self.sessions.insert(id, path.to_path_buf());
        if let Some(tracked) = self.tracked.get_mut(path) {
            tracked.sessions.insert(id);
        }

        tracing::info!(session = %id, path = %path.display(), "session opened");
        self.emit(Notification::SessionOpened {
            id,
            path: path.to_path_buf(),
        });
        id
    }

    fn resynchronize(&mut self, path: &Path) {
        let Some(tracked) = self.tracked.get(path) else {
            return;
        };
        let old_line_count = tracked.store.line_count();

        match tracked.store.resynchronize() {
            Ok(()) => {
                let new_line_count = tracked.store.line_count();
                let ids: Vec<_> = tracked.sessions.iter().copied().collect();
                for id in ids {
                    self.emit(Notification::ContentChanged {
                        id,
                        new_line_count,
                        old_line_count,
                    });
                }
            }
            Err(e) if e.is_gone() => self.remove_deleted(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "resynchronize failed");
                let description = e.to_string();
                let ids: Vec<_> = tracked.sessions.iter().copied().collect();
                for id in ids {
                    self.emit(Notification::TransientError {
                        id,
                        description: description.clone(),
                    });
                }
            }
        }
    }

    fn remove_deleted(&mut self, path: &Path) {
        let Some(tracked) = self.tracked.remove(path) else {
            return;
        };
        self.detector.unwatch(path);

        for id in tracked.sessions {
            self.sessions.remove(&id);
            self.deleted.insert(id, path.to_path_buf());
            tracing::info!(session = %id, path = %path.display(), "file deleted, closing session");
            self.emit(Notification::SessionClosed {
                id,
                reason: CloseReason::FileDeleted,
            });
        }
    }

    /// Whether a newly created `path` falls under a discovery directory.
    fn discovers(&self, path: &Path) -> bool {
        if !self.options.filter.matches(path) {
            return false;
        }
        self.directories.iter().any(|(dir, recursive)| {
            if *recursive {
                path != dir && path.starts_with(dir)
            } else {
                path.parent() == Some(dir.as_path())
            }
        })
    }

    fn emit(&self, notification: Notification) {
        // Observer hung up: nothing left to tell
        let _ = self.observer.send(notification);
    }
}

fn canonical(path: &Path) -> Result<PathBuf, StoreError> {
    path.canonicalize().map_err(|e| StoreError::on_open(path, e))
}
