use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hnthreads::{read_thread, set_global_multiprogress, DeadPolicy, ShardManifest, ThreadResolver};
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "hnthreads", version, about = "Resolve comment threads and package them into sharded tar.zst archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a timestamp-sorted comment dump into per-post archives.
    Run {
        /// A JSONL part file (optionally .zst) or a directory of them.
        #[arg(long)]
        input: PathBuf,
        /// Posts of interest: one id, JSON object or JSON row per line.
        #[arg(long)]
        posts: PathBuf,
        #[arg(long, default_value = "comments")]
        out: PathBuf,
        #[arg(long, default_value_t = 50)]
        num_shards: usize,
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
        /// Batches fetched ahead of resolution.
        #[arg(long, default_value_t = 4)]
        prefetch: usize,
        /// exclude | bridge
        #[arg(long, default_value_t = DeadPolicy::Exclude)]
        dead_policy: DeadPolicy,
        #[arg(long, default_value_t = 64 << 20)]
        max_entry_bytes: usize,
        #[arg(long, default_value_t = 3)]
        zstd_level: i32,
        /// Worker threads for archive packaging (defaults to all cores).
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long)]
        progress: bool,
    },
    /// Print one post's resolved thread from a finished output directory.
    Show {
        #[arg(long, default_value = "comments")]
        out: PathBuf,
        post_id: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    hnthreads::init_tracing_once();

    match cli.command {
        Command::Run {
            input,
            posts,
            out,
            num_shards,
            batch_size,
            prefetch,
            dead_policy,
            max_entry_bytes,
            zstd_level,
            threads,
            progress,
        } => {
            if progress {
                set_global_multiprogress(Arc::new(MultiProgress::new()));
            }
            let mut resolver = ThreadResolver::new()
                .out_dir(&out)
                .num_shards(num_shards)
                .batch_size(batch_size)
                .prefetch_batches(prefetch)
                .dead_policy(dead_policy)
                .max_entry_bytes(max_entry_bytes)
                .zstd_level(zstd_level)
                .progress(progress)
                .progress_label("Resolving comments")
                .posts_from_file(&posts)?;
            if let Some(n) = threads {
                resolver = resolver.parallelism(n);
            }

            let report = resolver
                .run_path(&input)
                .with_context(|| format!("resolve {}", input.display()))?;

            let s = &report.stats;
            println!(
                "Mapped {} comments into {} threads across {} archives",
                s.resolved,
                report.manifest.posts.len(),
                report.archives.len()
            );
            println!(
                "records={} orphans={} dead_or_deleted={} bridged={} malformed={} encode_failures={} out_of_order={}",
                s.records_seen, s.orphans, s.dead_or_deleted, s.bridged, s.malformed, s.encode_failures, s.out_of_order
            );
            println!("Manifest: {}", report.manifest_path.display());
            Ok(())
        }

        Command::Show { out, post_id } => {
            let manifest = ShardManifest::load(&out)?;
            let Some(comments) = read_thread(&out, &manifest, post_id)? else {
                bail!("post {post_id} has no thread in {}", out.display());
            };
            for c in comments {
                println!("{c}");
            }
            Ok(())
        }
    }
}
