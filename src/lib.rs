mod config;
mod error;
mod record;
mod paths;
mod zstd_jsonl;
mod source;

mod table;
mod threads;
mod resolver;

mod shard;
mod archive;
mod manifest;
mod stats;
mod posts;

mod progress;
mod util;
mod mem;

pub use crate::config::{DeadPolicy, ResolveOptions};
pub use crate::error::{EncodeError, RecordError, RunError};
pub use crate::record::{parse_record, parse_timestamp, Record};
pub use crate::source::{JsonlSource, RecordSource, SourceItem, VecSource};

pub use crate::table::ResolutionTable;
pub use crate::threads::{format_comment, ThreadAccumulator, COMMENT_SEPARATOR};
pub use crate::resolver::{Resolution, ResolutionPass, RunReport, ThreadResolver};

pub use crate::shard::{archive_name, archive_shard, assign_shard, remove_stale_archives, encode_entry, entry_name, ArchiveOutput, ShardedArchiveWriter, ENTRY_PREFIX};
pub use crate::manifest::{ManifestEntry, ShardManifest, MANIFEST_FILE};
pub use crate::stats::RunStats;
pub use crate::posts::load_post_ids;

// Read side, for consumers of the archives.
pub use crate::archive::{read_archive, read_thread, split_comments};

// Input discovery and line readers.
pub use crate::paths::discover_inputs;
pub use crate::zstd_jsonl::{open_lines, InputKind};

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, make_count_progress, make_record_progress};

// Expose memory helpers.
pub use crate::mem::{available_memory_fraction, MemoryWatch};

//export robust file ops from util so binaries can import from crate root.
pub use crate::util::{init_tracing_once, open_with_backoff, create_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
