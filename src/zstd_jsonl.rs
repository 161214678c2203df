//! Line readers over plain or zstd-compressed JSONL part files.

use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use zstd::stream::read::Decoder;

/// Compression of an input part file, decided by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Plain,
    Zstd,
}

impl InputKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zst") => InputKind::Zstd,
            _ => InputKind::Plain,
        }
    }
}

/// Open `path` as a buffered line stream, decompressing `.zst` transparently.
///
/// We request `window_log_max(31)` up front to avoid "Frame requires too much memory"
/// on very large frames. Unlike a best-effort scan, decode errors are never skipped here:
/// resolution depends on every earlier record, so the caller must fail the run.
pub fn open_lines(path: &Path, read_buf_bytes: usize) -> Result<Box<dyn BufRead + Send>> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let cap = read_buf_bytes.max(8 * 1024);
    Ok(match InputKind::of(path) {
        InputKind::Plain => Box::new(BufReader::with_capacity(cap, file)),
        InputKind::Zstd => {
            let mut decoder = Decoder::new(file)
                .with_context(|| format!("zstd decoder for {}", path.display()))?;
            decoder.window_log_max(31)?;
            Box::new(BufReader::with_capacity(cap, decoder))
        }
    })
}

/// Read the next line into `buf`, stripping a trailing `\r?\n`.
/// Returns bytes consumed; 0 means EOF.
pub fn read_trimmed_line<R: BufRead + ?Sized>(reader: &mut R, buf: &mut String) -> io::Result<usize> {
    buf.clear();
    let n = reader.read_line(buf)?;
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') { buf.pop(); }
    }
    Ok(n)
}
