//! Read side of the shard archives, for downstream consumers and verification.

use crate::manifest::ShardManifest;
use crate::shard::ENTRY_PREFIX;
use crate::threads::COMMENT_SEPARATOR;
use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use zstd::stream::read::Decoder;

/// Visit every `(post_id, payload)` entry of one shard archive, in stored order.
/// `visit` returns false to stop early.
fn for_each_entry(path: &Path, mut visit: impl FnMut(u64, String) -> bool) -> Result<()> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let mut decoder = Decoder::new(file)?;
    decoder.window_log_max(31)?;
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries().with_context(|| format!("read {}", path.display()))? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let Some(post_id) = name.strip_prefix(ENTRY_PREFIX).and_then(|s| s.parse::<u64>().ok()) else {
            tracing::debug!(archive = %path.display(), entry = %name, "ignoring foreign entry");
            continue;
        };
        let mut payload = String::with_capacity(entry.size() as usize);
        entry
            .read_to_string(&mut payload)
            .with_context(|| format!("read entry {name} in {}", path.display()))?;
        if !visit(post_id, payload) {
            break;
        }
    }
    Ok(())
}

/// Decode a whole shard archive into `post_id → payload`.
pub fn read_archive(path: &Path) -> Result<BTreeMap<u64, String>> {
    let mut out = BTreeMap::new();
    for_each_entry(path, |post_id, payload| {
        out.insert(post_id, payload);
        true
    })?;
    Ok(out)
}

/// Split an entry payload back into its comments.
pub fn split_comments(payload: &str) -> Vec<String> {
    if payload.is_empty() {
        return Vec::new();
    }
    payload.split(COMMENT_SEPARATOR).map(str::to_string).collect()
}

/// Fetch one post's thread, opening only the archive the manifest points at.
pub fn read_thread(out_dir: &Path, manifest: &ShardManifest, post_id: u64) -> Result<Option<Vec<String>>> {
    let Some(entry) = manifest.locate(post_id) else {
        return Ok(None);
    };
    let mut found = None;
    for_each_entry(&out_dir.join(&entry.archive), |id, payload| {
        if id == post_id {
            found = Some(split_comments(&payload));
            return false;
        }
        true
    })?;
    Ok(found)
}
