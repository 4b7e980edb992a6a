//! Newline scanning shared by the line stores.

use super::decode_line;
use std::io::{self, BufRead, Read};

/// Read size for the counting pass
const SCAN_CHUNK: usize = 64 * 1024;

/// Outcome of a full counting pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    pub line_count: usize,
    pub bytes: u64,
}

/// Count `\n`-delimited records in `reader`.
///
/// A trailing record without a terminator counts as one line. Every time
/// the count reaches a multiple of `interval`, `mark` is called with the line
/// number and the byte offset where the next line starts.
pub fn count_lines<R: Read>(
    mut reader: R,
    interval: usize,
    mut mark: impl FnMut(usize, u64),
) -> io::Result<ScanResult> {
    let interval = interval.max(1);
    let mut buf = vec![0u8; SCAN_CHUNK];
    let mut line_count = 0usize;
    let mut offset = 0u64;
    let mut open_record = false;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        for pos in memchr::memchr_iter(b'\n', &buf[..n]) {
            line_count += 1;
            if line_count % interval == 0 {
                mark(line_count, offset + pos as u64 + 1);
            }
        }

        open_record = buf[n - 1] != b'\n';
        offset += n as u64;
    }

    if open_record {
        line_count += 1;
    }

    Ok(ScanResult {
        line_count,
        bytes: offset,
    })
}

/// Advance past `n` terminated lines without copying them.
///
/// Returns how many lines were actually skipped (fewer at end of file).
pub fn skip_lines<R: BufRead>(reader: &mut R, n: usize) -> io::Result<usize> {
    let mut skipped = 0;
    while skipped < n {
        let (consumed, ended_line) = {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            match memchr::memchr(b'\n', buf) {
                Some(i) => (i + 1, true),
                None => (buf.len(), false),
            }
        };
        reader.consume(consumed);
        if ended_line {
            skipped += 1;
        }
    }
    Ok(skipped)
}

/// Read up to `count` records from the current position.
pub fn take_lines<R: BufRead>(reader: &mut R, count: usize) -> io::Result<Vec<String>> {
    let mut lines = Vec::with_capacity(count.min(1024));
    let mut raw = Vec::new();
    while lines.len() < count {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        lines.push(decode_line(&raw));
    }
    Ok(lines)
}
