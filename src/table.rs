//! Online id → root mapping with path compression at insertion time.
//!
//! Every registered id points straight at its root post, never at an intermediate
//! comment, so resolving a record is a single lookup of its parent no matter how deep
//! the thread is. This only works when parents are registered before their children,
//! which the time-ordered input guarantees and this table does not check.

use crate::record::Record;
use ahash::AHashMap;

pub struct ResolutionTable {
    roots: AHashMap<u64, u64>,
    posts: usize,
}

impl ResolutionTable {
    /// Seed the table with the posts of interest, each mapped to itself.
    pub fn new<I>(post_ids: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let roots: AHashMap<u64, u64> = post_ids.into_iter().map(|id| (id, id)).collect();
        let posts = roots.len();
        Self { roots, posts }
    }

    /// Resolve `record` through its parent and register its id under the same root.
    ///
    /// Returns `None` for orphans: the parent is null, unknown, not yet seen, or belongs to
    /// a post outside the set of interest. Orphans leave the table untouched.
    /// An id that is already registered keeps its first root, so posts stay self-mapped.
    #[inline]
    pub fn resolve_and_register(&mut self, record: &Record) -> Option<u64> {
        let parent = record.parent_id?;
        let root = *self.roots.get(&parent)?;
        Some(*self.roots.entry(record.id).or_insert(root))
    }

    #[inline]
    pub fn root_of(&self, id: u64) -> Option<u64> {
        self.roots.get(&id).copied()
    }

    #[inline]
    pub fn contains(&self, id: u64) -> bool {
        self.roots.contains_key(&id)
    }

    /// Number of registered ids, seeded posts included.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn post_count(&self) -> usize {
        self.posts
    }
}
