//! The resolution run: one forward pass over the sorted stream, then archive packaging.
//!
//! Comments carry only their immediate parent, which may be the post or another comment.
//! Walking the stream oldest-first, each comment's parent has already been seen and
//! mapped to its post, so one lookup attributes the comment and registers it for its own
//! replies. The end result is a flattened list of comments per post.

use crate::config::{DeadPolicy, ResolveOptions};
use crate::error::RunError;
use crate::manifest::ShardManifest;
use crate::mem::MemoryWatch;
use crate::paths::discover_inputs;
use crate::posts::load_post_ids;
use crate::progress::make_record_progress;
use crate::record::Record;
use crate::shard::{archive_name, remove_stale_archives, ShardedArchiveWriter};
use crate::source::{JsonlSource, RecordSource, SourceItem};
use crate::stats::RunStats;
use crate::table::ResolutionTable;
use crate::threads::{format_comment, ThreadAccumulator};
use crate::util::init_tracing_once;
use ahash::AHashSet;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver};
use indicatif::ProgressBar;
use std::fs;
use std::path::{Path, PathBuf};

/// Sequential resolution state. Owned by exactly one run, never shared.
pub struct ResolutionPass {
    table: ResolutionTable,
    threads: ThreadAccumulator,
    stats: RunStats,
    policy: DeadPolicy,
    max_timestamp: Option<i64>,
}

/// What the pass leaves behind once the stream is exhausted.
pub struct Resolution {
    pub table: ResolutionTable,
    pub threads: ThreadAccumulator,
    pub stats: RunStats,
}

impl ResolutionPass {
    pub fn new<I>(post_ids: I, policy: DeadPolicy) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        Self {
            table: ResolutionTable::new(post_ids),
            threads: ThreadAccumulator::new(),
            stats: RunStats::default(),
            policy,
            max_timestamp: None,
        }
    }

    /// Apply one batch, in order. Batches must arrive in stream order.
    pub fn apply_batch(&mut self, batch: Vec<SourceItem>) {
        self.stats.batches += 1;
        for item in batch {
            self.apply_item(item);
        }
    }

    pub fn apply_item(&mut self, item: SourceItem) {
        match item {
            SourceItem::Record(rec) => {
                self.apply(&rec);
            }
            SourceItem::Malformed { origin, error } => {
                self.stats.records_seen += 1;
                self.stats.malformed += 1;
                tracing::warn!(%origin, %error, "skipping malformed record");
            }
        }
    }

    /// Resolve one record. Returns the root its text was appended to, if any.
    pub fn apply(&mut self, record: &Record) -> Option<u64> {
        self.stats.records_seen += 1;
        self.track_order(record.timestamp);

        if !record.is_live() {
            self.stats.dead_or_deleted += 1;
            if self.policy == DeadPolicy::Bridge && self.table.resolve_and_register(record).is_some() {
                self.stats.bridged += 1;
            }
            return None;
        }

        match self.table.resolve_and_register(record) {
            Some(root) => {
                self.threads.append(root, format_comment(&record.author, &record.text));
                self.stats.resolved += 1;
                Some(root)
            }
            None => {
                self.stats.orphans += 1;
                tracing::trace!(id = record.id, parent = ?record.parent_id, "orphan dropped");
                None
            }
        }
    }

    /// Ordering is a precondition, not something we repair; we only count violations.
    fn track_order(&mut self, ts: Option<i64>) {
        let Some(ts) = ts else { return };
        match self.max_timestamp {
            Some(max) if ts < max => self.stats.out_of_order += 1,
            _ => self.max_timestamp = Some(ts),
        }
    }

    pub fn table(&self) -> &ResolutionTable { &self.table }
    pub fn threads(&self) -> &ThreadAccumulator { &self.threads }
    pub fn stats(&self) -> &RunStats { &self.stats }

    pub fn finish(self) -> Resolution {
        Resolution { table: self.table, threads: self.threads, stats: self.stats }
    }
}

/// Outputs of a successful run.
#[derive(Debug)]
pub struct RunReport {
    /// One archive per shard, in shard order.
    pub archives: Vec<PathBuf>,
    pub manifest_path: PathBuf,
    pub manifest: ShardManifest,
    pub stats: RunStats,
}

#[derive(Clone, Default)]
pub struct ThreadResolver {
    pub(crate) opts: ResolveOptions,
    posts: AHashSet<u64>,
}

impl ThreadResolver {
    pub fn new() -> Self {
        Self::default()
    }

    // -------- Builder methods --------
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_out_dir(dir); self }
    pub fn num_shards(mut self, n: usize) -> Self { self.opts = self.opts.with_num_shards(n); self }
    pub fn batch_size(mut self, n: usize) -> Self { self.opts = self.opts.with_batch_size(n); self }
    pub fn prefetch_batches(mut self, n: usize) -> Self { self.opts = self.opts.with_prefetch_batches(n); self }
    pub fn dead_policy(mut self, policy: DeadPolicy) -> Self { self.opts = self.opts.with_dead_policy(policy); self }
    pub fn max_entry_bytes(mut self, bytes: usize) -> Self { self.opts = self.opts.with_max_entry_bytes(bytes); self }
    pub fn zstd_level(mut self, level: i32) -> Self { self.opts = self.opts.with_zstd_level(level); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }
    pub fn low_memory_fraction(mut self, fraction: f64) -> Self { self.opts = self.opts.with_low_memory_fraction(fraction); self }
    pub fn options(mut self, opts: ResolveOptions) -> Self { self.opts = opts; self }

    /// Add posts of interest.
    pub fn posts<I: IntoIterator<Item = u64>>(mut self, ids: I) -> Self {
        self.posts.extend(ids);
        self
    }

    /// Add posts of interest from a file (see `load_post_ids` for accepted formats).
    pub fn posts_from_file(mut self, path: &Path) -> Result<Self> {
        self.posts.extend(load_post_ids(path)?);
        Ok(self)
    }

    pub fn opts(&self) -> &ResolveOptions {
        &self.opts
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// Plan a JSONL source over `input` (a part file or a directory of them).
    pub fn open_source(&self, input: &Path) -> Result<JsonlSource> {
        let files = discover_inputs(input)?;
        if files.is_empty() {
            tracing::warn!(input = %input.display(), "no input part files found");
        } else {
            tracing::info!(files = files.len(), input = %input.display(), "planned input parts");
        }
        Ok(JsonlSource::new(files, self.opts.batch_size, self.opts.read_buffer_bytes))
    }

    /// Full run over JSONL part files under `input`.
    pub fn run_path(&self, input: &Path) -> Result<RunReport, RunError> {
        init_tracing_once();
        let source = self.open_source(input).map_err(RunError::SourceUnavailable)?;
        self.run(source)
    }

    /// Resolution only: consume `source` and return the table, threads and counters.
    ///
    /// Fetching runs on its own thread, at most `prefetch_batches` ahead, behind a bounded
    /// channel. This thread applies batches in the order they were produced, which is
    /// stream order because there is a single producer.
    pub fn resolve<S>(&self, source: S) -> Result<Resolution, RunError>
    where
        S: RecordSource + Send,
    {
        init_tracing_once();
        let mut pass = ResolutionPass::new(self.posts.iter().copied(), self.opts.dead_policy);
        let mut watch = MemoryWatch::new(self.opts.low_memory_fraction);
        let pb = if self.opts.progress {
            Some(make_record_progress(self.opts.progress_label.as_deref()))
        } else {
            None
        };
        let depth = self.opts.prefetch_batches.max(1);

        std::thread::scope(|scope| {
            let (tx, rx) = bounded::<Result<Vec<SourceItem>>>(depth);
            let mut source = source;
            scope.spawn(move || loop {
                let msg = match source.next_batch() {
                    Ok(Some(batch)) => Ok(batch),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = msg.is_err();
                // A closed channel means the consumer gave up; stop fetching.
                if tx.send(msg).is_err() || failed {
                    break;
                }
            });
            apply_stream(rx, &mut pass, &mut watch, pb.as_ref())
        })?;

        if let Some(pb) = pb {
            pb.finish_with_message(format!("mapped {} comments", pass.stats().resolved));
        }
        Ok(pass.finish())
    }

    /// Resolve `source` and package every thread into `num_shards` archives plus manifest.
    ///
    /// The manifest is removed first and only written back once every archive is in place,
    /// so its presence is the completion signal. Archives are overwritten, never appended.
    pub fn run<S>(&self, source: S) -> Result<RunReport, RunError>
    where
        S: RecordSource + Send,
    {
        init_tracing_once();
        if let Some(n) = self.opts.parallelism { if n > 0 { rayon::ThreadPoolBuilder::new().num_threads(n).build_global().ok(); } }

        let out_dir = self.opts.out_dir.clone();
        prepare_output(&out_dir, self.opts.num_shards).map_err(|source| RunError::ArchiveWrite { path: out_dir.clone(), source })?;

        if self.posts.is_empty() {
            tracing::warn!("no posts of interest configured; every record will be an orphan");
        }
        tracing::info!(
            posts = self.posts.len(),
            num_shards = self.opts.num_shards,
            batch_size = self.opts.batch_size,
            dead_policy = %self.opts.dead_policy,
            "starting thread resolution"
        );

        let Resolution { table, threads, mut stats } = self.resolve(source)?;
        tracing::info!(
            records = stats.records_seen,
            resolved = stats.resolved,
            orphans = stats.orphans,
            dead_or_deleted = stats.dead_or_deleted,
            malformed = stats.malformed,
            out_of_order = stats.out_of_order,
            table_entries = table.len(),
            threads = threads.thread_count(),
            "stream exhausted"
        );
        if stats.out_of_order > 0 {
            tracing::warn!(out_of_order = stats.out_of_order, "input was not sorted by timestamp; replies may have been orphaned");
        }
        drop(table);

        let writer = ShardedArchiveWriter::new(&out_dir, &self.opts)
            .map_err(|source| RunError::ArchiveWrite { path: out_dir.clone(), source })?;
        let output = writer.finalize(threads.drain_with_posts(self.posts.iter().copied()))?;
        stats.encode_failures = output.encode_failures;

        let manifest = ShardManifest {
            num_shards: writer.num_shards(),
            archives: (0..writer.num_shards()).map(archive_name).collect(),
            posts: output.entries,
            stats: stats.clone(),
        };
        let manifest_path = manifest
            .save_atomic(&out_dir)
            .map_err(|source| RunError::Manifest { path: ShardManifest::path_in(&out_dir), source })?;

        tracing::info!(
            posts = manifest.posts.len(),
            comments = manifest.total_comments(),
            archives = output.archives.len(),
            encode_failures = stats.encode_failures,
            manifest = %manifest_path.display(),
            "run complete"
        );
        Ok(RunReport { archives: output.archives, manifest_path, manifest, stats })
    }
}

fn prepare_output(out_dir: &Path, num_shards: usize) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    ShardManifest::remove_stale(out_dir)?;
    let removed = remove_stale_archives(out_dir, num_shards)?;
    if removed > 0 {
        tracing::info!(removed, "removed archives from a previous run with more shards");
    }
    Ok(())
}

/// Consume batches until the producer hangs up. Dropping `rx` on return (including on
/// error) unblocks a producer stuck on a full channel.
fn apply_stream(
    rx: Receiver<Result<Vec<SourceItem>>>,
    pass: &mut ResolutionPass,
    watch: &mut MemoryWatch,
    pb: Option<&ProgressBar>,
) -> Result<(), RunError> {
    for msg in rx {
        let batch = msg.map_err(RunError::SourceUnavailable)?;
        let n = batch.len() as u64;
        pass.apply_batch(batch);
        watch.check(pass.threads().total_bytes(), pass.table().len());
        if let Some(pb) = pb {
            pb.inc(n);
        }
    }
    Ok(())
}
