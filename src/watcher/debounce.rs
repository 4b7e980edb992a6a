//! Collapsing of modification bursts.
//!
//! Log writers append in rapid bursts; each raw write would otherwise cost
//! the consumer a full rescan. The first `Modified` for a path opens a
//! window, and repeats inside that window are absorbed. `Created` and
//! `Deleted` pass through immediately, after any pending modification for
//! the same path, so per-path order is preserved.

use super::DomainEvent;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    /// Pending modifications, ordered by deadline (the window is fixed,
    /// so insertion order is deadline order)
    pending: VecDeque<(PathBuf, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Feed one event observed at `now`. Returns events ready immediately.
    pub fn push(&mut self, event: DomainEvent, now: Instant) -> Vec<DomainEvent> {
        match event {
            DomainEvent::Modified(path) => {
                if self.position(&path).is_none() {
                    self.pending.push_back((path, now + self.window));
                }
                Vec::new()
            }
            DomainEvent::Created(path) => {
                let mut ready = Vec::with_capacity(2);
                if let Some(i) = self.position(&path) {
                    if let Some((pending, _)) = self.pending.remove(i) {
                        ready.push(DomainEvent::Modified(pending));
                    }
                }
                ready.push(DomainEvent::Created(path));
                ready
            }
            DomainEvent::Deleted(path) => {
                // A modification of a file that is now gone is superseded
                if let Some(i) = self.position(&path) {
                    self.pending.remove(i);
                }
                vec![DomainEvent::Deleted(path)]
            }
        }
    }

    /// Pop every modification whose window has closed by `now`.
    pub fn drain_due(&mut self, now: Instant) -> Vec<DomainEvent> {
        let mut due = Vec::new();
        while let Some((_, deadline)) = self.pending.front() {
            if *deadline > now {
                break;
            }
            if let Some((path, _)) = self.pending.pop_front() {
                due.push(DomainEvent::Modified(path));
            }
        }
        due
    }

    /// Pop everything regardless of deadline (shutdown)
    pub fn drain_all(&mut self) -> Vec<DomainEvent> {
        self.pending
            .drain(..)
            .map(|(path, _)| DomainEvent::Modified(path))
            .collect()
    }

    /// Earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|(_, d)| *d)
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.pending.iter().position(|(p, _)| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_burst_collapses_to_one() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        for i in 0..20 {
            assert!(d.push(DomainEvent::Modified(p("/a.log")), t0 + ms(i * 2)).is_empty());
        }
        assert_eq!(d.pending_len(), 1);
        assert!(d.drain_due(t0 + ms(99)).is_empty());
        assert_eq!(d.drain_due(t0 + ms(100)), vec![DomainEvent::Modified(p("/a.log"))]);
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn test_new_window_after_flush() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.push(DomainEvent::Modified(p("/a.log")), t0);
        assert_eq!(d.drain_due(t0 + ms(150)).len(), 1);
        d.push(DomainEvent::Modified(p("/a.log")), t0 + ms(160));
        assert_eq!(d.next_deadline(), Some(t0 + ms(260)));
    }

    #[test]
    fn test_paths_debounced_independently() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.push(DomainEvent::Modified(p("/a.log")), t0);
        d.push(DomainEvent::Modified(p("/b.log")), t0 + ms(50));
        assert_eq!(d.drain_due(t0 + ms(120)), vec![DomainEvent::Modified(p("/a.log"))]);
        assert_eq!(d.drain_due(t0 + ms(160)), vec![DomainEvent::Modified(p("/b.log"))]);
    }

    #[test]
    fn test_created_flushes_pending_first() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.push(DomainEvent::Modified(p("/a.log")), t0);
        let ready = d.push(DomainEvent::Created(p("/a.log")), t0 + ms(10));
        assert_eq!(
            ready,
            vec![
                DomainEvent::Modified(p("/a.log")),
                DomainEvent::Created(p("/a.log"))
            ]
        );
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn test_deleted_supersedes_pending_modify() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.push(DomainEvent::Modified(p("/a.log")), t0);
        d.push(DomainEvent::Modified(p("/b.log")), t0);
        let ready = d.push(DomainEvent::Deleted(p("/a.log")), t0 + ms(10));
        assert_eq!(ready, vec![DomainEvent::Deleted(p("/a.log"))]);
        assert_eq!(d.drain_all(), vec![DomainEvent::Modified(p("/b.log"))]);
    }

    #[test]
    fn test_next_deadline_empty() {
        let d = Debouncer::new(WINDOW);
        assert_eq!(d.next_deadline(), None);
        assert_eq!(d.window(), WINDOW);
    }
}
