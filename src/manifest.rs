use crate::stats::RunStats;
use crate::util::{create_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Where one post's thread lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub comments: usize,
    pub shard: usize,
    /// Archive file name relative to the output directory.
    pub archive: String,
}

/// Completion marker and index for a run's archives.
///
/// Its presence in the output directory means every archive was written. Maps are
/// ordered and no wall-clock data is stored, so identical inputs give identical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub num_shards: usize,
    pub archives: Vec<String>,
    pub posts: BTreeMap<u64, ManifestEntry>,
    pub stats: RunStats,
}

impl ShardManifest {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn locate(&self, post_id: u64) -> Option<&ManifestEntry> {
        self.posts.get(&post_id)
    }

    /// Posts stored in `shard`, ascending.
    pub fn posts_in_shard(&self, shard: usize) -> impl Iterator<Item = u64> + '_ {
        self.posts.iter().filter(move |(_, e)| e.shard == shard).map(|(id, _)| *id)
    }

    pub fn total_comments(&self) -> u64 {
        self.posts.values().map(|e| e.comments as u64).sum()
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let p = Self::path_in(dir);
        let f = File::open(&p).with_context(|| format!("open {}", p.display()))?;
        let m = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse {}", p.display()))?;
        Ok(m)
    }

    /// Write via a temp file, then promote. Returns the final path.
    pub fn save_atomic(&self, dir: &Path) -> Result<PathBuf> {
        let p = Self::path_in(dir);
        let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
        let f = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.write_all(b"\n")?;
        w.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        replace_file_atomic_backoff(&tmp, &p)?;
        Ok(p)
    }

    /// Drop a previous run's manifest so a failing rerun cannot look complete.
    pub fn remove_stale(dir: &Path) -> Result<()> {
        remove_with_backoff(&Self::path_in(dir), 16, 50)
    }
}
