use crate::util::open_with_backoff;
use crate::zstd_jsonl::read_trimmed_line;
use ahash::AHashSet;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::io::BufReader;
use std::path::Path;

/// Load the posts of interest.
///
/// One post per line, any of:
///   `12345`
///   `{"id": 12345, "title": "..."}`      (JSONL from the selection stage)
///   `[12345, "title", 87, "https://..."]` (row tuples, id first)
/// Blank lines and `#` comments are skipped. Any other line is an error: a silently
/// shrunken post set would look like a successful run with missing threads.
pub fn load_post_ids(path: &Path) -> Result<AHashSet<u64>> {
    let f = open_with_backoff(path, 16, 50).with_context(|| format!("open posts file {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut ids = AHashSet::new();
    let mut buf = String::new();
    let mut line_no = 0u64;
    while read_trimmed_line(&mut r, &mut buf)? > 0 {
        line_no += 1;
        let line = buf.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id = parse_post_line(line)
            .with_context(|| format!("{}:{}: unrecognized post line `{}`", path.display(), line_no, line))?;
        ids.insert(id);
    }
    tracing::info!(posts = ids.len(), path = %path.display(), "loaded posts of interest");
    Ok(ids)
}

fn parse_post_line(line: &str) -> Result<u64> {
    if let Ok(id) = line.parse::<u64>() {
        return Ok(id);
    }
    let v: Value = serde_json::from_str(line)?;
    let id = match &v {
        Value::Object(map) => map.get("id"),
        Value::Array(items) => items.first(),
        _ => None,
    };
    match id {
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| anyhow!("id {n} is not a positive integer")),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| anyhow!("id `{s}` is not an integer")),
        _ => Err(anyhow!("no id field")),
    }
}
