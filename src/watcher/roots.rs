//! Registered watch roots and the OS-level watches backing them.
//!
//! A file root is observed through its parent directory so that rotation
//! (delete + recreate) keeps being reported. Several roots may share one OS
//! watch; it is removed when the last root using it goes away.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Kind of a registered root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    File,
    Directory { recursive: bool },
}

/// One OS watch and the number of roots relying on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsWatch {
    pub recursive: bool,
    pub users: usize,
}

/// What has to happen to the OS watcher for a new root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Install {
    /// Already covered by an existing OS watch
    Covered,
    /// No watch on this directory yet
    New { dir: PathBuf, recursive: bool },
    /// Existing non-recursive watch must become recursive
    Upgrade { dir: PathBuf },
}

/// A root and the OS watch directory serving it
#[derive(Debug, Clone, PartialEq, Eq)]
struct Registered {
    kind: RootKind,
    serving: PathBuf,
}

#[derive(Debug, Default)]
pub struct RootTable {
    roots: HashMap<PathBuf, Registered>,
    os_watches: HashMap<PathBuf, OsWatch>,
}

/// Directory whose OS watch serves `root`
pub fn os_dir(root: &Path, kind: RootKind) -> PathBuf {
    match kind {
        RootKind::File => root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf()),
        RootKind::Directory { .. } => root.to_path_buf(),
    }
}

impl RootTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, root: &Path) -> Option<RootKind> {
        self.roots.get(root).map(|r| r.kind)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    #[cfg(test)]
    pub fn os_watch(&self, dir: &Path) -> Option<OsWatch> {
        self.os_watches.get(dir).copied()
    }

    /// Existing OS watch that already sees events in `dir`: one on `dir`
    /// itself, else a recursive one on an ancestor.
    fn covering<'a>(&'a self, dir: &'a Path) -> Option<&'a Path> {
        if self.os_watches.contains_key(dir) {
            return Some(dir);
        }
        dir.ancestors().skip(1).find(|a| {
            self.os_watches
                .get(*a)
                .is_some_and(|w| w.recursive)
        })
    }

    /// Decide which OS watch change registering `root` requires.
    pub fn plan(&self, root: &Path, kind: RootKind) -> Install {
        let dir = os_dir(root, kind);
        let recursive = matches!(kind, RootKind::Directory { recursive: true });
        match self.covering(&dir) {
            None => Install::New { dir, recursive },
            Some(serving)
                if serving == dir
                    && recursive
                    && self.os_watches.get(serving).is_some_and(|w| !w.recursive) =>
            {
                Install::Upgrade { dir }
            }
            Some(_) => Install::Covered,
        }
    }

    /// Record `root` after its OS watch is in place.
    ///
    /// Re-inserting a root with the same kind is a no-op; a root changing
    /// kind must be removed first.
    pub fn insert(&mut self, root: PathBuf, kind: RootKind) {
        match self.roots.get(&root) {
            Some(existing) if existing.kind == kind => return,
            Some(_) => debug_assert!(false, "root re-registered with a different kind"),
            None => {}
        }
        let dir = os_dir(&root, kind);
        let recursive = matches!(kind, RootKind::Directory { recursive: true });
        let serving = self
            .covering(&dir)
            .map(Path::to_path_buf)
            .unwrap_or(dir);
        let watch = self.os_watches.entry(serving.clone()).or_insert(OsWatch {
            recursive,
            users: 0,
        });
        watch.recursive |= recursive;
        watch.users += 1;
        self.roots.insert(root, Registered { kind, serving });
    }

    /// Forget `root`. Returns the OS directory to unwatch when no other root
    /// needs it any more.
    pub fn remove(&mut self, root: &Path) -> Option<PathBuf> {
        let registered = self.roots.remove(root)?;
        let dir = registered.serving;
        self.release(&dir).then_some(dir)
    }

    /// Decrement the users of `dir`; true when it dropped to zero.
    fn release(&mut self, dir: &Path) -> bool {
        match self.os_watches.get_mut(dir) {
            Some(w) if w.users > 1 => {
                w.users -= 1;
                false
            }
            Some(_) => {
                self.os_watches.remove(dir);
                true
            }
            None => false,
        }
    }

    /// Whether an event for `path` belongs to any registered root.
    pub fn in_scope(&self, path: &Path) -> bool {
        if self.get(path) == Some(RootKind::File) {
            return true;
        }
        if let Some(parent) = path.parent() {
            if matches!(self.get(parent), Some(RootKind::Directory { .. })) {
                return true;
            }
        }
        self.roots.iter().any(|(root, registered)| {
            matches!(registered.kind, RootKind::Directory { recursive: true })
                && path != root
                && path.starts_with(root)
        })
    }
}
