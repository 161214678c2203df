//! Record sources: forward-only, batched, consumed once per run.

use crate::error::RecordError;
use crate::record::{parse_record, Record};
use crate::zstd_jsonl::{open_lines, read_trimmed_line};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::PathBuf;

/// One unit of input as seen by the resolver.
#[derive(Debug)]
pub enum SourceItem {
    Record(Record),
    /// A line that could not be parsed. `origin` locates it for the log (`file:line`).
    Malformed { origin: String, error: RecordError },
}

impl From<Record> for SourceItem {
    fn from(r: Record) -> Self {
        SourceItem::Record(r)
    }
}

/// Lazy, finite sequence of batches sorted by timestamp ascending, within and across
/// batches. `Ok(None)` marks the end of the stream. An `Err` is a failure of the stream
/// itself (I/O, corrupt compression), not of a single record.
pub trait RecordSource {
    fn next_batch(&mut self) -> Result<Option<Vec<SourceItem>>>;
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn next_batch(&mut self) -> Result<Option<Vec<SourceItem>>> {
        (**self).next_batch()
    }
}

// ----------------------------- JSONL part files ------------------------------------

struct OpenPart {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    line_no: u64,
}

/// Streams JSONL records from an ordered list of part files (plain or `.zst`),
/// one file after the other. Only the current line is held in memory.
pub struct JsonlSource {
    files: Vec<PathBuf>,
    next_file: usize,
    current: Option<OpenPart>,
    batch_size: usize,
    read_buf_bytes: usize,
    line: String,
}

impl JsonlSource {
    pub fn new(files: Vec<PathBuf>, batch_size: usize, read_buf_bytes: usize) -> Self {
        Self {
            files,
            next_file: 0,
            current: None,
            batch_size: batch_size.max(1),
            read_buf_bytes,
            line: String::with_capacity(16 * 1024),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Make sure a part is open. Returns false once every file is exhausted.
    fn ensure_open(&mut self) -> Result<bool> {
        if self.current.is_some() {
            return Ok(true);
        }
        let Some(path) = self.files.get(self.next_file).cloned() else {
            return Ok(false);
        };
        self.next_file += 1;
        let reader = open_lines(&path, self.read_buf_bytes)?;
        tracing::debug!(path = %path.display(), "opened input part");
        self.current = Some(OpenPart { path, reader, line_no: 0 });
        Ok(true)
    }
}

impl RecordSource for JsonlSource {
    fn next_batch(&mut self) -> Result<Option<Vec<SourceItem>>> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            if !self.ensure_open()? {
                break;
            }
            let Some(part) = self.current.as_mut() else { break };
            let n = read_trimmed_line(&mut part.reader, &mut self.line)
                .with_context(|| format!("read {} after line {}", part.path.display(), part.line_no))?;
            if n == 0 {
                self.current = None;
                continue;
            }
            part.line_no += 1;
            if self.line.trim().is_empty() {
                continue;
            }
            batch.push(match parse_record(&self.line) {
                Ok(rec) => SourceItem::Record(rec),
                Err(error) => SourceItem::Malformed {
                    origin: format!("{}:{}", part.path.display(), part.line_no),
                    error,
                },
            });
        }
        Ok(if batch.is_empty() { None } else { Some(batch) })
    }
}

// ----------------------------- In-memory ------------------------------------

/// In-memory source for tests and embedding callers that already hold sorted records.
pub struct VecSource {
    items: std::vec::IntoIter<SourceItem>,
    batch_size: usize,
}

impl VecSource {
    pub fn new<I, T>(items: I, batch_size: usize) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SourceItem>,
    {
        let items: Vec<SourceItem> = items.into_iter().map(Into::into).collect();
        Self { items: items.into_iter(), batch_size: batch_size.max(1) }
    }
}

impl RecordSource for VecSource {
    fn next_batch(&mut self) -> Result<Option<Vec<SourceItem>>> {
        let batch: Vec<SourceItem> = self.items.by_ref().take(self.batch_size).collect();
        Ok(if batch.is_empty() { None } else { Some(batch) })
    }
}
