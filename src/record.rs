use crate::error::RecordError;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// One discussion record. Immutable once read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub id: u64,
    /// Immediate parent: another comment or a root post. `None` never resolves.
    pub parent_id: Option<u64>,
    pub author: String,
    /// Raw comment text, HTML entities still escaped.
    pub text: String,
    /// Unix seconds. Only used to count ordering violations.
    pub timestamp: Option<i64>,
    pub is_dead: bool,
    pub is_deleted: bool,
}

impl Record {
    /// A live comment replying to `parent_id`.
    pub fn comment(id: u64, parent_id: u64, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: Some(parent_id),
            author: author.into(),
            text: text.into(),
            timestamp: None,
            is_dead: false,
            is_deleted: false,
        }
    }
    pub fn at(mut self, timestamp: i64) -> Self { self.timestamp = Some(timestamp); self }
    pub fn dead(mut self) -> Self { self.is_dead = true; self }
    pub fn deleted(mut self) -> Self { self.is_deleted = true; self }

    #[inline]
    pub fn is_live(&self) -> bool {
        !self.is_dead && !self.is_deleted
    }
}

// ----------------------------- Wire schema ------------------------------------

/// Accepts both the long field names and the short ones used by the public
/// Hacker News export (`by`, `parent`, `dead`, `deleted`, `time`).
/// Extra fields are ignored by serde.
#[derive(Debug, Deserialize)]
struct RawRecord {
    id: Option<RawId>,
    #[serde(alias = "parent")]
    parent_id: Option<RawId>,
    #[serde(alias = "by")]
    author: Option<String>,
    text: Option<String>,
    timestamp: Option<RawTimestamp>,
    time: Option<RawTimestamp>,
    #[serde(alias = "dead")]
    is_dead: Option<bool>,
    #[serde(alias = "deleted")]
    is_deleted: Option<bool>,
}

/// Warehouse JSON exports sometimes quote 64-bit integers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u64),
    Text(String),
}

impl RawId {
    fn into_id(self) -> Result<u64, RecordError> {
        match self {
            RawId::Num(n) => Ok(n),
            RawId::Text(s) => s.trim().parse().map_err(|_| RecordError::InvalidId(s)),
        }
    }
}

/// Parquet-to-JSON exports write epoch seconds as floats (`1160418111.0`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Secs(i64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    fn into_secs(self) -> Result<i64, RecordError> {
        match self {
            RawTimestamp::Secs(n) => Ok(n),
            RawTimestamp::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
            RawTimestamp::Float(f) => Err(RecordError::Timestamp(f.to_string())),
            RawTimestamp::Text(s) => parse_timestamp(&s).ok_or(RecordError::Timestamp(s)),
        }
    }
}

/// Parse a single JSON line into a `Record`.
///
/// `id` is always required. `author` and `text` are required only for live records:
/// dead or deleted comments routinely arrive with both nulled out, and they still carry
/// the ids needed by the bridging policy.
pub fn parse_record(line: &str) -> Result<Record, RecordError> {
    let raw: RawRecord = serde_json::from_str(line)?;

    let id = raw.id.ok_or(RecordError::Missing("id"))?.into_id()?;
    let parent_id = raw.parent_id.map(RawId::into_id).transpose()?;
    let is_dead = raw.is_dead.unwrap_or(false);
    let is_deleted = raw.is_deleted.unwrap_or(false);
    let live = !is_dead && !is_deleted;

    let timestamp = raw.timestamp.or(raw.time).map(RawTimestamp::into_secs).transpose()?;

    let author = match raw.author {
        Some(a) => a,
        None if live => return Err(RecordError::Missing("author")),
        None => String::new(),
    };
    let text = match raw.text {
        Some(t) => t,
        None if live => return Err(RecordError::Missing("text")),
        None => String::new(),
    };

    Ok(Record { id, parent_id, author, text, timestamp, is_dead, is_deleted })
}

/// Unix seconds from integer strings, RFC 3339, or the warehouse form
/// `YYYY-MM-DD HH:MM:SS[.ffffff] UTC`. Fractional seconds are truncated.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(dt.unix_timestamp());
    }
    let s = s.strip_suffix(" UTC").or_else(|| s.strip_suffix('Z')).unwrap_or(s);
    let whole = s.split('.').next().unwrap_or(s).replacen('T', " ", 1);
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(&whole, &fmt)
        .ok()
        .map(|dt| dt.assume_utc().unix_timestamp())
}
