#[path = "common/mod.rs"]
mod common;

use anyhow::anyhow;
use common::*;
use hnthreads::{
    format_comment, parse_record, parse_timestamp, DeadPolicy, JsonlSource, Record, RecordError, RecordSource,
    ResolutionPass, ResolutionTable, RunError, ShardManifest, SourceItem, ThreadAccumulator, ThreadResolver,
    VecSource,
};

/// A reply to a reply lands on the root post, and every registered id points straight
/// at the post rather than at its parent comment.
#[test]
fn table_compresses_paths_at_insertion() {
    let mut table = ResolutionTable::new([10]);
    assert_eq!(table.resolve_and_register(&Record::comment(11, 10, "a", "x")), Some(10));
    assert_eq!(table.resolve_and_register(&Record::comment(12, 11, "b", "y")), Some(10));
    assert_eq!(table.resolve_and_register(&Record::comment(13, 12, "c", "z")), Some(10));

    assert_eq!(table.root_of(10), Some(10));
    assert_eq!(table.root_of(12), Some(10));
    assert_eq!(table.root_of(13), Some(10));
    assert_eq!(table.len(), 4);
    assert_eq!(table.post_count(), 1);
}

/// Orphans (unknown parent, missing parent) return `None` and leave the table untouched.
#[test]
fn table_leaves_orphans_unregistered() {
    let mut table = ResolutionTable::new([10]);
    assert_eq!(table.resolve_and_register(&Record::comment(21, 99, "a", "x")), None);

    let mut no_parent = Record::comment(22, 10, "a", "x");
    no_parent.parent_id = None;
    assert_eq!(table.resolve_and_register(&no_parent), None);

    assert!(!table.contains(21));
    assert!(!table.contains(22));
    assert_eq!(table.len(), 1);
}

/// Posts are self-mapped and stay that way even if a record reuses a post id.
#[test]
fn table_keeps_first_registration() {
    let mut table = ResolutionTable::new([10, 20]);
    table.resolve_and_register(&Record::comment(20, 10, "a", "x"));
    assert_eq!(table.root_of(20), Some(20));
}

/// Comments accumulate per root in arrival order; drain hands threads over by post id.
#[test]
fn accumulator_preserves_arrival_order() {
    let mut acc = ThreadAccumulator::new();
    acc.append(7, format_comment("a", "one"));
    acc.append(3, format_comment("b", "two"));
    acc.append(7, format_comment("c", "three"));

    assert_eq!(acc.thread(7).unwrap(), ["<a> one", "<c> three"]);
    assert_eq!(acc.comment_count(3), 1);
    assert_eq!(acc.comment_count(99), 0);
    assert_eq!(acc.thread_count(), 2);
    assert_eq!(acc.total_comments(), 3);
    assert_eq!(acc.total_bytes(), "<a> one".len() + "<b> two".len() + "<c> three".len());

    let drained = acc.drain();
    assert_eq!(drained.keys().copied().collect::<Vec<_>>(), vec![3, 7]);
}

/// Formatting decodes HTML entities exactly once.
#[test]
fn format_comment_decodes_entities_once() {
    assert_eq!(
        format_comment("dave", "I&#x27;d say &lt;b&gt;no&lt;&#x2F;b&gt; &amp; &quot;yes&quot;"),
        "<dave> I'd say <b>no</b> & \"yes\""
    );
    // An escaped entity stays an entity after one decode.
    assert_eq!(format_comment("x", "&amp;lt;"), "<x> &lt;");
}

/// Both wire shapes parse; dead records may omit author and text; live ones may not.
#[test]
fn parse_record_accepts_both_shapes() {
    let hn = parse_record(&hn_comment(5, 4, "pg", "hi", 1_160_418_111)).unwrap();
    assert_eq!(hn, Record::comment(5, 4, "pg", "hi").at(1_160_418_111));

    let wh = parse_record(&warehouse_comment(6, 5, "sama", "yo", "2006-10-09 18:21:51 UTC")).unwrap();
    assert_eq!(wh.id, 6);
    assert_eq!(wh.parent_id, Some(5));
    assert_eq!(wh.timestamp, Some(1_160_418_111));

    let dead = parse_record(&hn_dead(7, 5, 10)).unwrap();
    assert!(dead.is_dead && !dead.is_live());
    assert!(dead.author.is_empty());

    assert!(matches!(parse_record(r#"{"parent": 1, "by": "a", "text": "x"}"#), Err(RecordError::Missing("id"))));
    assert!(matches!(parse_record(r#"{"id": 1, "parent": 1, "text": "x"}"#), Err(RecordError::Missing("author"))));
    assert!(matches!(parse_record(r#"{"id": "abc", "by": "a", "text": "x"}"#), Err(RecordError::InvalidId(_))));
    assert!(matches!(parse_record("not json"), Err(RecordError::Json(_))));
}

/// Float epoch seconds (parquet-to-JSON exports) are accepted in both timestamp fields.
#[test]
fn parse_record_accepts_float_timestamps() {
    let rec = parse_record(r#"{"id": 1, "parent": 2, "by": "a", "text": "x", "time": 1160418111.0}"#).unwrap();
    assert_eq!(rec.timestamp, Some(1_160_418_111));

    let rec = parse_record(r#"{"id": 1, "parent": 2, "by": "a", "text": "x", "timestamp": 1160418111.75}"#).unwrap();
    assert_eq!(rec.timestamp, Some(1_160_418_111));

    let rec = parse_record(r#"{"id": 1, "parent": 2, "by": "a", "text": "x", "time": "2006-10-09 18:21:51 UTC"}"#).unwrap();
    assert_eq!(rec.timestamp, Some(1_160_418_111));

    assert!(matches!(
        parse_record(r#"{"id": 1, "by": "a", "text": "x", "timestamp": "soon"}"#),
        Err(RecordError::Timestamp(_))
    ));
}

/// Timestamps: integers, RFC 3339, and the `... UTC` warehouse form (fractions truncated).
#[test]
fn parse_timestamp_forms() {
    assert_eq!(parse_timestamp("1160418111"), Some(1_160_418_111));
    assert_eq!(parse_timestamp("2006-10-09T18:21:51Z"), Some(1_160_418_111));
    assert_eq!(parse_timestamp("2006-10-09 18:21:51.750000 UTC"), Some(1_160_418_111));
    assert_eq!(parse_timestamp("yesterday"), None);
}

/// Comment chains arriving in timestamp order all resolve to their post, and records
/// under posts outside the set are counted as orphans.
#[test]
fn pass_resolves_chain_and_counts_orphans() {
    let mut pass = ResolutionPass::new([100], DeadPolicy::Exclude);
    let records = vec![
        Record::comment(1, 100, "alice", "a").at(1),
        Record::comment(2, 1, "bob", "b").at(2),
        Record::comment(3, 2, "carol", "c").at(3),
        Record::comment(4, 555, "dave", "d").at(4),
        Record::comment(5, 4, "erin", "e").at(5),
    ];
    for r in &records {
        pass.apply(r);
    }

    assert_eq!(pass.threads().thread(100).unwrap(), ["<alice> a", "<bob> b", "<carol> c"]);
    let stats = pass.stats();
    assert_eq!(stats.records_seen, 5);
    assert_eq!(stats.resolved, 3);
    assert_eq!(stats.orphans, 2);
    assert_eq!(stats.out_of_order, 0);
}

/// A reply that arrives before its parent is an orphan; the violation is counted, not repaired.
#[test]
fn pass_counts_out_of_order_records() {
    let mut pass = ResolutionPass::new([100], DeadPolicy::Exclude);
    pass.apply(&Record::comment(2, 1, "bob", "early reply").at(20));
    pass.apply(&Record::comment(1, 100, "alice", "parent").at(10));
    pass.apply(&Record::comment(3, 100, "carol", "later").at(30));

    assert_eq!(pass.stats().out_of_order, 1);
    assert_eq!(pass.stats().orphans, 1);
    assert_eq!(pass.threads().thread(100).unwrap(), ["<alice> parent", "<carol> later"]);
}

/// Dead comments never contribute text. Under `Exclude` their replies are orphaned;
/// under `Bridge` the replies still reach the post.
#[test]
fn dead_policy_exclude_vs_bridge() {
    let records = [
        Record::comment(1, 100, "alice", "live").at(1),
        Record::comment(2, 1, "", "").at(2).dead(),
        Record::comment(3, 2, "bob", "reply to dead").at(3),
        Record::comment(4, 100, "", "").at(4).deleted(),
    ];

    let mut exclude = ResolutionPass::new([100], DeadPolicy::Exclude);
    records.iter().for_each(|r| { exclude.apply(r); });
    assert_eq!(exclude.threads().thread(100).unwrap(), ["<alice> live"]);
    assert_eq!(exclude.stats().dead_or_deleted, 2);
    assert_eq!(exclude.stats().bridged, 0);
    assert_eq!(exclude.stats().orphans, 1);
    assert!(!exclude.table().contains(2));

    let mut bridge = ResolutionPass::new([100], DeadPolicy::Bridge);
    records.iter().for_each(|r| { bridge.apply(r); });
    assert_eq!(bridge.threads().thread(100).unwrap(), ["<alice> live", "<bob> reply to dead"]);
    assert_eq!(bridge.stats().dead_or_deleted, 2);
    assert_eq!(bridge.stats().bridged, 2);
    assert_eq!(bridge.stats().orphans, 0);
    assert_eq!(bridge.table().root_of(2), Some(100));
}

/// Malformed lines are skipped and counted without stopping the stream.
#[test]
fn jsonl_source_reports_malformed_lines() {
    let base = temp_base();
    let part = base.join("part.jsonl");
    write_plain_lines(
        &part,
        &[
            hn_comment(1, 100, "alice", "ok", 1),
            "not json".to_string(),
            String::new(),
            r#"{"id": 2, "parent": 1, "by": "bob"}"#.to_string(),
            hn_comment(3, 1, "carol", "also ok", 3),
        ],
    );

    let resolution = ThreadResolver::new()
        .posts([100])
        .batch_size(2)
        .resolve(JsonlSource::new(vec![part], 2, 64 * 1024))
        .unwrap();

    let stats = &resolution.stats;
    assert_eq!(stats.records_seen, 4, "blank lines are not records");
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.resolved, 2);
    assert_eq!(stats.batches, 2);
    assert_eq!(resolution.threads.thread(100).unwrap(), ["<alice> ok", "<carol> also ok"]);
}

/// Batch boundaries and prefetch depth do not change the outcome.
#[test]
fn resolve_is_independent_of_batching() {
    let records: Vec<Record> = (1..=50u64)
        .map(|i| {
            let parent = if i % 5 == 1 { 100 + i % 3 } else { i - 1 };
            Record::comment(i, parent, format!("u{i}"), format!("t{i}")).at(i as i64)
        })
        .collect();

    let reference = ThreadResolver::new()
        .posts([100, 101, 102])
        .resolve(VecSource::new(records.clone(), 1000))
        .unwrap();
    assert_eq!(reference.stats.resolved, 50);
    let expected = reference.threads.drain();

    for (batch, prefetch) in [(1, 1), (3, 2), (7, 16)] {
        let got = ThreadResolver::new()
            .posts([100, 101, 102])
            .prefetch_batches(prefetch)
            .resolve(VecSource::new(records.clone(), batch))
            .unwrap();
        assert_eq!(got.stats.resolved, 50);
        assert_eq!(got.stats.batches, (50 + batch as u64 - 1) / batch as u64);
        assert_eq!(got.threads.drain(), expected);
    }
}

/// Yields `good` batches and then fails, the way a dropped connection would.
struct FailingSource {
    good: usize,
    next: u64,
}

impl RecordSource for FailingSource {
    fn next_batch(&mut self) -> anyhow::Result<Option<Vec<SourceItem>>> {
        if self.good == 0 {
            return Err(anyhow!("connection reset"));
        }
        self.good -= 1;
        self.next += 1;
        Ok(Some(vec![Record::comment(self.next, 100, "a", "x").at(self.next as i64).into()]))
    }
}

/// A failing source aborts the run with a retryable error, and a previous run's manifest
/// is gone so the half-finished output cannot be mistaken for a complete one.
#[test]
fn failing_source_aborts_without_manifest() {
    let base = temp_base();
    let out = base.join("out");

    ThreadResolver::new()
        .posts([100])
        .out_dir(&out)
        .num_shards(2)
        .run(VecSource::new(vec![Record::comment(1, 100, "a", "x").at(1)], 10))
        .unwrap();
    assert!(ShardManifest::path_in(&out).exists());

    let err = ThreadResolver::new()
        .posts([100])
        .out_dir(&out)
        .num_shards(2)
        .prefetch_batches(1)
        .run(FailingSource { good: 5, next: 0 })
        .unwrap_err();

    assert!(matches!(err, RunError::SourceUnavailable(_)));
    assert!(err.is_retryable());
    assert!(!ShardManifest::path_in(&out).exists());
}
