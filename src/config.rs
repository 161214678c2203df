use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What happens to a dead or deleted comment. Its text never reaches any thread either way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeadPolicy {
    /// Drop it entirely: no table entry, so its replies become orphans.
    #[default]
    Exclude,
    /// Register its id under its parent's root so replies still resolve.
    Bridge,
}

impl fmt::Display for DeadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeadPolicy::Exclude => "exclude",
            DeadPolicy::Bridge => "bridge",
        })
    }
}

impl FromStr for DeadPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(DeadPolicy::Exclude),
            "bridge" => Ok(DeadPolicy::Bridge),
            other => Err(format!("unknown dead policy `{other}` (expected exclude|bridge)")),
        }
    }
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct ResolveOptions {
    pub out_dir: PathBuf,
    pub num_shards: usize,            // archive fan-out; post_id % num_shards
    pub batch_size: usize,            // records per batch pulled from the source
    pub prefetch_batches: usize,      // bounded queue depth between fetch and apply
    pub dead_policy: DeadPolicy,
    pub max_entry_bytes: usize,       // per-post payload bound inside an archive
    pub zstd_level: i32,
    pub parallelism: Option<usize>,   // Some(N) to set rayon threads for the archive stage
    pub progress: bool,
    pub progress_label: Option<String>,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,

    // resolution stops to warn once when available RAM drops below this fraction
    pub low_memory_fraction: f64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("comments"),
            num_shards: 50,
            batch_size: 1000,
            prefetch_batches: 4,
            dead_policy: DeadPolicy::Exclude,
            max_entry_bytes: 64 * 1024 * 1024,
            zstd_level: 3,
            parallelism: None,
            progress: false,
            progress_label: None,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,

            low_memory_fraction: 0.10,
        }
    }
}

impl ResolveOptions {
    pub fn with_out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_num_shards(mut self, n: usize) -> Self {
        self.num_shards = n.max(1);
        self
    }
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }
    pub fn with_prefetch_batches(mut self, n: usize) -> Self {
        self.prefetch_batches = n.max(1);
        self
    }
    pub fn with_dead_policy(mut self, policy: DeadPolicy) -> Self {
        self.dead_policy = policy;
        self
    }
    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = bytes.max(1);
        self
    }
    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level.clamp(1, 22);
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }
    pub fn with_low_memory_fraction(mut self, fraction: f64) -> Self {
        self.low_memory_fraction = fraction.clamp(0.0, 1.0);
        self
    }
}
