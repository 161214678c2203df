use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Part files produced by a sorted export split into numbered chunks, e.g.
/// `000000000000.jsonl.zst`, `comments-0001.ndjson`, `part_3.json`.
fn part_file_regex() -> Regex {
    Regex::new(r"(?i)^[^.].*\.(jsonl|ndjson|json)(\.zst)?$").expect("static regex")
}

/// Resolve the input argument into an ordered list of part files.
///
/// A file path is used as-is. A directory is scanned one level deep and matching part
/// files are returned sorted by file name, which is the order an ordered export writes
/// its chunks in. Hidden files and unrelated extensions are ignored.
pub fn discover_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.exists() {
        anyhow::bail!("input {} does not exist", input.display());
    }
    let re = part_file_regex();
    let mut files = Vec::new();
    for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("scan {}", input.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if re.is_match(name) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}
