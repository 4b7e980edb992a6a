/// Sparse index entry - one per `interval` lines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct IndexEntry {
    /// Line number this entry points at
    line_number: usize,
    /// Byte offset in the file where this line starts
    byte_offset: u64,
}

/// Sparse line-start index with a fixed stride.
///
/// Instead of storing the byte offset of every line, only every Nth line is
/// recorded. Reads seek to the nearest entry at or before the requested line
/// and skip the remainder, so the skip cost is bounded by `interval`.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    /// Indexed entries, ascending by line number
    entries: Vec<IndexEntry>,
    /// Lines between index entries
    interval: usize,
}

impl SparseIndex {
    /// Create an empty index with the given interval (clamped to at least 1)
    pub fn new(interval: usize) -> Self {
        Self {
            entries: Vec::new(),
            interval: interval.max(1),
        }
    }

    #[cfg(test)]
    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Record that `line_number` starts at `byte_offset`.
    ///
    /// Called by the scanner every `interval` lines, in ascending order.
    pub fn append(&mut self, line_number: usize, byte_offset: u64) {
        debug_assert!(self
            .entries
            .last()
            .map_or(true, |e| e.line_number < line_number));
        self.entries.push(IndexEntry {
            line_number,
            byte_offset,
        });
    }

    /// Find where to start reading for `line`.
    ///
    /// Returns (byte offset of the nearest indexed line, lines to skip from there).
    pub fn locate(&self, line: usize) -> (u64, usize) {
        let chunk = line / self.interval;
        if chunk == 0 || self.entries.is_empty() {
            return (0, line);
        }

        let entry = self
            .entries
            .get(chunk - 1)
            .or_else(|| self.entries.last())
            .copied();

        match entry {
            Some(e) if e.line_number <= line => (e.byte_offset, line - e.line_number),
            _ => (0, line),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Approximate heap usage in bytes
    #[cfg(test)]
    pub fn memory_usage(&self) -> usize {
        self.entries.len() * std::mem::size_of::<IndexEntry>()
    }
}
