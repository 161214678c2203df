use ahash::AHashMap;
use std::collections::BTreeMap;

/// Joins the comments of one thread inside an archive entry. ASCII record separator:
/// comment text routinely carries newlines (`<pre>` blocks), never this byte.
pub const COMMENT_SEPARATOR: &str = "\u{1e}";

/// Display form of one comment: `<author> text`, with HTML entities decoded.
/// Decoding happens here, once per comment, so stored strings are final.
pub fn format_comment(author: &str, text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    let mut out = String::with_capacity(author.len() + decoded.len() + 3);
    out.push('<');
    out.push_str(author);
    out.push_str("> ");
    out.push_str(&decoded);
    out
}

/// Per-root append-only comment buffers, in arrival order.
#[derive(Default)]
pub struct ThreadAccumulator {
    threads: AHashMap<u64, Vec<String>>,
    comments: u64,
    bytes: usize,
}

impl ThreadAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the thread owned by `root_id`, creating it on first use.
    #[inline]
    pub fn append(&mut self, root_id: u64, formatted_comment: String) {
        self.bytes += formatted_comment.len();
        self.comments += 1;
        self.threads.entry(root_id).or_default().push(formatted_comment);
    }

    pub fn thread(&self, root_id: u64) -> Option<&[String]> {
        self.threads.get(&root_id).map(Vec::as_slice)
    }

    pub fn comment_count(&self, root_id: u64) -> usize {
        self.threads.get(&root_id).map_or(0, Vec::len)
    }

    /// Number of roots with at least one comment.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn total_comments(&self) -> u64 {
        self.comments
    }

    /// Bytes of formatted text currently buffered.
    pub fn total_bytes(&self) -> usize {
        self.bytes
    }

    /// End-of-stream flush point: hand every thread over, ordered by post id.
    pub fn drain(self) -> BTreeMap<u64, Vec<String>> {
        self.threads.into_iter().collect()
    }

    /// Like `drain`, but every id in `posts` gets a thread, empty if nothing arrived for it.
    /// Consumers can then tell "no comments" from "not a post of interest".
    pub fn drain_with_posts<I>(self, posts: I) -> BTreeMap<u64, Vec<String>>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut threads = self.drain();
        for post_id in posts {
            threads.entry(post_id).or_default();
        }
        threads
    }
}
