//! Architectural Contract Test: Bucket Isolation
//!
//! Constraints verified:
//! - A failed membership read skips only that bucket
//! - A failed write is reported and later buckets still run
//! - Rejected credentials abort the whole run
//!
//! If this test fails, one broken tag can block the entire import.

mod common;

use asnsync_core::config::MatchPattern;
use asnsync_core::model::RangeSet;
use asnsync_core::state::MemoryStateStore;
use asnsync_core::{BucketStatus, Error, SyncEngine, SyncEvent};
use common::*;

fn dataset() -> Vec<asnsync_core::RangeRecord> {
    vec![
        record("10.0.0.0/8", 64500, "Acme Corp"),
        record("192.0.2.0/24", 64501, "Beta Networks"),
        record("198.51.100.0/24", 64502, "Gamma Hosting"),
    ]
}

fn three_buckets() -> asnsync_core::SyncConfig {
    // BTreeMap ordering runs Acme, Beta, Gamma
    minimal_config(&[
        ("Acme", vec![MatchPattern::keyword("acme")]),
        ("Beta", vec![MatchPattern::keyword("beta")]),
        ("Gamma", vec![MatchPattern::keyword("gamma")]),
    ])
}

fn seeded_repository() -> MockTagRepository {
    let repository = MockTagRepository::new();
    let parent = repository.seed_tag("MaxMind Data", None, RangeSet::new());
    for name in ["Acme", "Beta", "Gamma"] {
        repository.seed_tag(name, Some(&parent), RangeSet::new());
    }
    repository
}

#[tokio::test]
async fn read_failure_does_not_block_later_buckets() {
    let repository = seeded_repository();
    repository.fail_reads_for("Acme");

    let (engine, mut events) = SyncEngine::new(
        Box::new(MockDatasetSource::new("v1", dataset())),
        Box::new(repository.clone()),
        Box::new(MemoryStateStore::new()),
        three_buckets(),
    )
    .expect("engine construction succeeds");

    let report = engine.run_once().await.expect("run completes");

    assert_eq!(report.failure_count(), 1);
    assert!(matches!(report.buckets[0].status, BucketStatus::ReadFailed { .. }));
    assert!(matches!(report.buckets[1].status, BucketStatus::Reconciled { .. }));
    assert!(matches!(report.buckets[2].status, BucketStatus::Reconciled { .. }));

    assert_eq!(repository.members_of("Acme"), Some(RangeSet::new()));
    assert_eq!(repository.members_of("Beta"), Some(ranges(&["192.0.2.0/24"])));
    assert_eq!(repository.members_of("Gamma"), Some(ranges(&["198.51.100.0/24"])));

    let mut skipped = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::BucketSkipped { bucket, .. } = event {
            skipped.push(bucket);
        }
    }
    assert_eq!(skipped, vec!["Acme".to_string()]);
}

#[tokio::test]
async fn write_failure_is_reported_and_run_continues() {
    let repository = seeded_repository();
    repository.fail_writes_for("Beta");

    let (engine, mut events) = SyncEngine::new(
        Box::new(MockDatasetSource::new("v1", dataset())),
        Box::new(repository.clone()),
        Box::new(MemoryStateStore::new()),
        three_buckets(),
    )
    .expect("engine construction succeeds");

    let report = engine.run_once().await.expect("run completes");

    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.buckets[1].name, "Beta");
    assert!(matches!(report.buckets[1].status, BucketStatus::WriteFailed { .. }));
    assert_eq!(repository.members_of("Gamma"), Some(ranges(&["198.51.100.0/24"])));

    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::RunFinished { failures } = event {
            finished = Some(failures);
        }
    }
    assert_eq!(finished, Some(1));
}

#[tokio::test]
async fn failed_tag_creation_is_a_write_failure() {
    let repository = MockTagRepository::new();
    repository.fail_writes_for("Beta");

    let (engine, _events) = SyncEngine::new(
        Box::new(MockDatasetSource::new("v1", dataset())),
        Box::new(repository.clone()),
        Box::new(MemoryStateStore::new()),
        three_buckets(),
    )
    .expect("engine construction succeeds");

    let report = engine.run_once().await.expect("run completes");

    assert_eq!(report.buckets[1].tag_id, None);
    assert!(matches!(report.buckets[1].status, BucketStatus::WriteFailed { .. }));
    assert!(repository.members_of("Beta").is_none());
    assert_eq!(repository.members_of("Gamma"), Some(ranges(&["198.51.100.0/24"])));
}

#[tokio::test]
async fn rejected_credentials_abort_the_run() {
    let repository = seeded_repository();
    repository.reject_credentials();

    let (engine, _events) = SyncEngine::new(
        Box::new(MockDatasetSource::new("v1", dataset())),
        Box::new(repository.clone()),
        Box::new(MemoryStateStore::new()),
        three_buckets(),
    )
    .expect("engine construction succeeds");

    let result = engine.run_once().await;

    assert!(matches!(result, Err(Error::Authentication(_))));
    assert_eq!(repository.connect_calls(), 1);
    assert_eq!(repository.read_calls(), 0);
    assert_eq!(repository.write_calls(), 0);
}

#[tokio::test]
async fn empty_bucket_clears_stale_members() {
    let repository = MockTagRepository::new();
    let parent = repository.seed_tag("MaxMind Data", None, RangeSet::new());
    repository.seed_tag("Delta", Some(&parent), ranges(&["203.0.113.0/24"]));

    let (engine, _events) = SyncEngine::new(
        Box::new(MockDatasetSource::new("v1", dataset())),
        Box::new(repository.clone()),
        Box::new(MemoryStateStore::new()),
        minimal_config(&[("Delta", vec![MatchPattern::keyword("delta")])]),
    )
    .expect("engine construction succeeds");

    let report = engine.run_once().await.expect("run completes");

    assert_eq!(
        report.buckets[0].status,
        BucketStatus::Reconciled {
            created: false,
            added: 0,
            removed: 1,
        }
    );
    assert_eq!(repository.members_of("Delta"), Some(RangeSet::new()));
}
