//! Deterministic post → shard routing and per-shard `tar.zst` archive packaging.
//!
//! File layout:
//!   <out>/_staging/comments-XXXX.tar.zst.inprogress  (temp)
//!   <out>/comments-XXXX.tar.zst                      (final, after the shard is complete)

use crate::config::ResolveOptions;
use crate::error::{EncodeError, RunError};
use crate::manifest::ManifestEntry;
use crate::progress::make_count_progress;
use crate::threads::COMMENT_SEPARATOR;
use crate::util::{create_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zstd::stream::write::Encoder as ZstdEncoder;

/// Directory prefix of every entry inside a shard archive.
pub const ENTRY_PREFIX: &str = "comments/";

/// Owning shard of a post. Pure, so any run with the same `num_shards` routes a post to
/// the same archive regardless of its comments.
#[inline]
pub fn assign_shard(post_id: u64, num_shards: usize) -> usize {
    (post_id % num_shards.max(1) as u64) as usize
}

pub fn archive_name(shard: usize) -> String {
    format!("comments-{shard}.tar.zst")
}

/// Inverse of `archive_name`.
pub fn archive_shard(file_name: &str) -> Option<usize> {
    file_name.strip_prefix("comments-")?.strip_suffix(".tar.zst")?.parse().ok()
}

/// Delete archives a previous run left for shards `>= num_shards`, so the directory holds
/// exactly this run's fan-out. Returns how many were removed.
pub fn remove_stale_archives(out_dir: &Path, num_shards: usize) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(out_dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("scan {}", out_dir.display()))?;
        let stale = entry
            .file_name()
            .to_str()
            .and_then(archive_shard)
            .is_some_and(|shard| shard >= num_shards.max(1));
        if stale && entry.file_type().is_file() {
            remove_with_backoff(entry.path(), 16, 50)?;
            tracing::debug!(path = %entry.path().display(), "removed stale archive");
            removed += 1;
        }
    }
    Ok(removed)
}

pub fn entry_name(post_id: u64) -> String {
    format!("{ENTRY_PREFIX}{post_id}")
}

/// Join a thread into one entry payload. Comments are already entity-decoded.
pub fn encode_entry(comments: &[String], max_bytes: usize) -> Result<Vec<u8>, EncodeError> {
    let bytes = comments.iter().map(String::len).sum::<usize>()
        + COMMENT_SEPARATOR.len() * comments.len().saturating_sub(1);
    if bytes > max_bytes {
        return Err(EncodeError::Oversized { bytes, limit: max_bytes });
    }
    if let Some(index) = comments.iter().position(|c| c.contains(COMMENT_SEPARATOR)) {
        return Err(EncodeError::Separator { index });
    }
    let payload = comments.join(COMMENT_SEPARATOR);
    if let Some(offset) = payload.find('\0') {
        return Err(EncodeError::NulByte { offset });
    }
    Ok(payload.into_bytes())
}

/// Result of packaging every shard.
#[derive(Debug)]
pub struct ArchiveOutput {
    /// One path per shard, in shard order.
    pub archives: Vec<PathBuf>,
    pub entries: BTreeMap<u64, ManifestEntry>,
    pub encode_failures: u64,
}

struct ShardOutput {
    path: PathBuf,
    written: Vec<(u64, usize)>,
    failures: u64,
}

pub struct ShardedArchiveWriter {
    out_dir: PathBuf,
    staging: PathBuf,
    num_shards: usize,
    zstd_level: i32,
    max_entry_bytes: usize,
    write_buf: usize,
    progress: bool,
}

impl ShardedArchiveWriter {
    pub fn new(out_dir: &Path, opts: &ResolveOptions) -> Result<Self> {
        let staging = out_dir.join("_staging");
        fs::create_dir_all(&staging).with_context(|| format!("create {}", staging.display()))?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            staging,
            num_shards: opts.num_shards.max(1),
            zstd_level: opts.zstd_level,
            max_entry_bytes: opts.max_entry_bytes,
            write_buf: opts.write_buffer_bytes,
            progress: opts.progress,
        })
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    pub fn archive_path(&self, shard: usize) -> PathBuf {
        self.out_dir.join(archive_name(shard))
    }

    /// Package every thread into its shard archive. Shards are independent and written in
    /// parallel; every shard gets an archive, empty or not. Any shard failing to write
    /// fails the whole call.
    pub fn finalize(&self, threads: BTreeMap<u64, Vec<String>>) -> Result<ArchiveOutput, RunError> {
        let mut by_shard: Vec<Vec<(u64, Vec<String>)>> = (0..self.num_shards).map(|_| Vec::new()).collect();
        for (post_id, comments) in threads {
            by_shard[assign_shard(post_id, self.num_shards)].push((post_id, comments));
        }

        let pb = if self.progress {
            Some(make_count_progress(self.num_shards as u64, "Packaging archives"))
        } else {
            None
        };

        let shards = by_shard
            .into_par_iter()
            .enumerate()
            .map(|(shard, posts)| {
                let out = self.write_shard(shard, &posts);
                if let Some(pb) = &pb { pb.inc(1); }
                out
            })
            .collect::<Result<Vec<_>, RunError>>()?;

        if let Some(pb) = pb { pb.finish_with_message("archives written"); }
        // Leftovers from an earlier failed run keep the directory around; that is fine.
        let _ = fs::remove_dir(&self.staging);

        let mut output = ArchiveOutput {
            archives: Vec::with_capacity(shards.len()),
            entries: BTreeMap::new(),
            encode_failures: 0,
        };
        for (shard, s) in shards.into_iter().enumerate() {
            let archive = archive_name(shard);
            for (post_id, comments) in s.written {
                output.entries.insert(post_id, ManifestEntry { comments, shard, archive: archive.clone() });
            }
            output.encode_failures += s.failures;
            output.archives.push(s.path);
        }
        Ok(output)
    }

    fn write_shard(&self, shard: usize, posts: &[(u64, Vec<String>)]) -> Result<ShardOutput, RunError> {
        let path = self.archive_path(shard);
        let tmp = self.staging.join(format!("{}.inprogress", archive_name(shard)));
        let mut out = ShardOutput { path, written: Vec::with_capacity(posts.len()), failures: 0 };
        self.write_shard_to(shard, &tmp, posts, &mut out)
            .map_err(|source| RunError::ArchiveWrite { path: out.path.clone(), source })?;
        tracing::debug!(shard, posts = out.written.len(), skipped = out.failures, "shard archive written");
        Ok(out)
    }

    fn write_shard_to(
        &self,
        shard: usize,
        tmp: &Path,
        posts: &[(u64, Vec<String>)],
        out: &mut ShardOutput,
    ) -> Result<()> {
        let file = create_with_backoff(tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        let enc = ZstdEncoder::new(BufWriter::with_capacity(self.write_buf, file), self.zstd_level)?;
        let mut tar = tar::Builder::new(enc);

        for (post_id, comments) in posts {
            let data = match encode_entry(comments, self.max_entry_bytes) {
                Ok(d) => d,
                Err(e) => {
                    out.failures += 1;
                    tracing::warn!(post_id = *post_id, shard, error = %e, "skipping post: entry not encodable");
                    continue;
                }
            };
            // Fixed metadata keeps archive bytes a function of content only.
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            tar.append_data(&mut header, entry_name(*post_id), data.as_slice())
                .with_context(|| format!("append post {post_id}"))?;
            out.written.push((*post_id, comments.len()));
        }

        let enc = tar.into_inner().context("finish tar stream")?;
        let mut w = enc.finish().context("finish zstd frame")?;
        w.flush()?;
        w.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        replace_file_atomic_backoff(tmp, &out.path)
    }
}
