#![allow(dead_code)]

use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a compressed `.zst` file containing the provided JSONL lines.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Write an uncompressed JSONL file.
pub fn write_plain_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
}

/// A comment row in the public HN export shape (`by`, `parent`, `time`).
pub fn hn_comment(id: u64, parent: u64, by: &str, text: &str, time: i64) -> String {
    json!({ "id": id, "parent": parent, "by": by, "text": text, "time": time, "type": "comment" }).to_string()
}

/// A comment row in the warehouse shape: quoted ids and a `... UTC` timestamp string.
pub fn warehouse_comment(id: u64, parent: u64, author: &str, text: &str, timestamp: &str) -> String {
    json!({
        "id": id.to_string(), "parent_id": parent.to_string(), "author": author,
        "text": text, "timestamp": timestamp, "is_dead": false, "is_deleted": false
    })
    .to_string()
}

/// A dead comment as the export ships it: author and text nulled out.
pub fn hn_dead(id: u64, parent: u64, time: i64) -> String {
    json!({ "id": id, "parent": parent, "by": null, "text": null, "time": time, "dead": true }).to_string()
}

/// A fresh temp directory that outlives the `TempDir` guard.
pub fn temp_base() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// Build a tiny time-sorted corpus split over two parts:
/// - posts of interest: 100 and 200 (written to `posts.txt`); 300 is not of interest.
/// - part-000.jsonl.zst:
///     1 by "alice" -> 100
///     2 by "bob"   -> 1      (reply to a reply)
///     3 by "carol" -> 300    (post not of interest: orphan)
///     4 by "dave"  -> 200, text with HTML entities
/// - part-001.jsonl (plain, warehouse shape):
///     5 by "erin"  -> 2      (depth 3 under 100)
///     6 (dead)     -> 4
///     7 by "frank" -> 6      (reply to a dead comment: orphan under the default policy)
///     8 by "grace" -> 3      (reply to an orphan: orphan)
pub fn make_corpus_basic() -> PathBuf {
    let base = temp_base();

    write_plain_lines(
        &base.join("posts.txt"),
        &["# posts of interest".to_string(), "100".to_string(), r#"{"id": 200, "title": "Show HN"}"#.to_string()],
    );

    let part0 = vec![
        hn_comment(1, 100, "alice", "first", 1_000),
        hn_comment(2, 1, "bob", "second", 1_010),
        hn_comment(3, 300, "carol", "elsewhere", 1_020),
        hn_comment(4, 200, "dave", "I&#x27;d say &lt;b&gt;no&lt;&#x2F;b&gt; &amp; &quot;yes&quot;", 1_030),
    ];
    write_zst_lines(&base.join("input").join("part-000.jsonl.zst"), &part0);

    let part1 = vec![
        warehouse_comment(5, 2, "erin", "third", "1970-01-01 00:17:20 UTC"),
        hn_dead(6, 4, 1_050),
        warehouse_comment(7, 6, "frank", "under the dead one", "1970-01-01 00:17:40.250000 UTC"),
        hn_comment(8, 3, "grace", "reply to orphan", 1_070),
    ];
    write_plain_lines(&base.join("input").join("part-001.jsonl"), &part1);

    base
}

/// Add a part with a valid name but non-zstd content, sorted after the good parts.
pub fn add_corrupt_part(base: &Path) {
    let corrupt = base.join("input").join("part-002.jsonl.zst");
    fs::create_dir_all(corrupt.parent().unwrap()).unwrap();
    let mut f = File::create(corrupt).unwrap();
    // Not a zstd stream:
    writeln!(&mut f, "{}", hn_comment(9, 100, "mallory", "garbage", 1_080)).unwrap();
}
