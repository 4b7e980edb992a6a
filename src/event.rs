use std::fmt;
use std::path::PathBuf;

/// Identifier of one open view (tab) of a tracked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed on request; the file may still exist
    UserClosed,
    /// The file disappeared from disk
    FileDeleted,
}

/// Notifications delivered to the observer (the UI layer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    SessionOpened {
        id: SessionId,
        path: PathBuf,
    },
    /// The file was resynchronized; re-render if the counts differ or the
    /// visible window may have been rewritten
    ContentChanged {
        id: SessionId,
        new_line_count: usize,
        old_line_count: usize,
    },
    SessionClosed {
        id: SessionId,
        reason: CloseReason,
    },
    /// Non-fatal failure; the session stays open and the next change retries
    TransientError {
        id: SessionId,
        description: String,
    },
}

impl Notification {
    pub fn session(&self) -> SessionId {
        match self {
            Notification::SessionOpened { id, .. }
            | Notification::ContentChanged { id, .. }
            | Notification::SessionClosed { id, .. }
            | Notification::TransientError { id, .. } => *id,
        }
    }

    /// True for a content change that lost lines (truncation or replacement)
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Notification::ContentChanged {
                new_line_count,
                old_line_count,
                ..
            } if new_line_count < old_line_count
        )
    }
}
