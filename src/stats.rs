use serde::{Deserialize, Serialize};

/// Counters for one run. Every silently dropped input is accounted for here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Items pulled from the source, malformed lines included.
    pub records_seen: u64,
    /// Live comments attributed to a root and appended to its thread.
    pub resolved: u64,
    /// Live comments whose parent was unknown when they arrived.
    pub orphans: u64,
    pub dead_or_deleted: u64,
    /// Dead/deleted comments registered in the table under `DeadPolicy::Bridge`.
    pub bridged: u64,
    pub malformed: u64,
    /// Posts whose archive entry could not be encoded.
    pub encode_failures: u64,
    /// Records whose timestamp went backwards relative to an earlier record.
    pub out_of_order: u64,
    pub batches: u64,
}
