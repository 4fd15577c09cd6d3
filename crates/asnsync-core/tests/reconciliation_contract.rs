//! Architectural Contract Test: Reconciliation
//!
//! Constraints verified:
//! - A delta is exactly (desired - current, current - desired)
//! - Reconciling equal sets yields an empty delta
//! - Applying a delta then reconciling again yields an empty delta
//! - Repeated engine runs against unchanged remote state make no writes
//!
//! If this test fails, tags drift away from the dataset.

mod common;

use asnsync_core::config::MatchPattern;
use asnsync_core::model::RangeSet;
use asnsync_core::reconcile::{apply, reconcile};
use asnsync_core::state::MemoryStateStore;
use asnsync_core::traits::StateStore;
use asnsync_core::{BucketStatus, SyncEngine};
use common::*;

#[test]
fn delta_is_a_pair_of_set_differences() {
    let desired = ranges(&["10.0.0.0/8", "192.168.0.0/16"]);
    let current = ranges(&["192.168.0.0/16", "172.16.0.0/12"]);

    let delta = reconcile(&desired, &current);

    assert_eq!(delta.to_add, ranges(&["10.0.0.0/8"]));
    assert_eq!(delta.to_remove, ranges(&["172.16.0.0/12"]));
}

#[test]
fn equal_sets_reconcile_to_nothing() {
    let sets = [
        RangeSet::new(),
        ranges(&["10.0.0.0/8"]),
        ranges(&["2001:db8::/32", "198.51.100.0/24", "203.0.113.0/24"]),
    ];

    for set in &sets {
        assert!(reconcile(set, set).is_empty(), "{:?}", set);
    }
}

#[test]
fn same_inputs_give_same_delta() {
    let desired = ranges(&["10.0.0.0/8", "2001:db8::/32"]);
    let current = ranges(&["172.16.0.0/12"]);

    assert_eq!(reconcile(&desired, &current), reconcile(&desired, &current));
}

#[test]
fn applied_delta_converges() {
    let cases = [
        (ranges(&["10.0.0.0/8", "192.168.0.0/16"]), ranges(&["192.168.0.0/16", "172.16.0.0/12"])),
        (RangeSet::new(), ranges(&["172.16.0.0/12", "2001:db8::/32"])),
        (ranges(&["198.51.100.0/24"]), RangeSet::new()),
    ];

    for (desired, current) in &cases {
        let delta = reconcile(desired, current);
        let updated = apply(current, &delta);

        assert_eq!(&updated, desired);
        assert!(reconcile(desired, &updated).is_empty());
    }
}

#[test]
fn no_range_is_both_added_and_removed() {
    let desired = ranges(&["10.0.0.0/8", "10.1.0.0/16", "192.0.2.0/24"]);
    let current = ranges(&["10.1.0.0/16", "192.0.2.0/24", "198.51.100.0/24"]);

    let delta = reconcile(&desired, &current);

    assert!(delta.to_add.is_disjoint(&delta.to_remove));
    assert!(delta.to_add.is_disjoint(&current));
    assert!(delta.to_remove.is_disjoint(&desired));
}

#[tokio::test]
async fn engine_brings_existing_tag_in_line() {
    let source = MockDatasetSource::new(
        "v1",
        vec![
            record("10.0.0.0/8", 64500, "Acme Corp Holdings"),
            record("192.168.0.0/16", 64500, "ACME Corp Holdings"),
            record("203.0.113.0/24", 64501, "Other Networks"),
        ],
    );
    let repository = MockTagRepository::new();
    let parent = repository.seed_tag("MaxMind Data", None, RangeSet::new());
    let acme = repository.seed_tag(
        "Acme",
        Some(&parent),
        ranges(&["192.168.0.0/16", "172.16.0.0/12"]),
    );

    let (engine, _events) = SyncEngine::new(
        Box::new(source),
        Box::new(repository.clone()),
        Box::new(MemoryStateStore::new()),
        minimal_config(&[("Acme", vec![MatchPattern::keyword("acme")])]),
    )
    .expect("engine construction succeeds");

    let report = engine.run_once().await.expect("run succeeds");

    assert_eq!(report.buckets.len(), 1);
    assert_eq!(report.buckets[0].tag_id.as_deref(), Some(acme.as_str()));
    assert_eq!(
        report.buckets[0].status,
        BucketStatus::Reconciled {
            created: false,
            added: 1,
            removed: 1,
        }
    );
    assert_eq!(
        repository.members_of("Acme"),
        Some(ranges(&["10.0.0.0/8", "192.168.0.0/16"]))
    );
}

#[tokio::test]
async fn missing_tag_is_created_under_parent() {
    let source = MockDatasetSource::new(
        "v1",
        vec![
            record("8.8.8.0/24", 15169, "Google LLC"),
            record("2001:4860::/32", 15169, "Google LLC"),
        ],
    );
    let repository = MockTagRepository::new();
    let state = MemoryStateStore::new();

    let (engine, _events) = SyncEngine::new(
        Box::new(source),
        Box::new(repository.clone()),
        Box::new(state.clone()),
        minimal_config(&[("Google", vec![MatchPattern::asn(15169)])]),
    )
    .expect("engine construction succeeds");

    let report = engine.run_once().await.expect("run succeeds");

    assert_eq!(
        report.buckets[0].status,
        BucketStatus::Reconciled {
            created: true,
            added: 2,
            removed: 0,
        }
    );

    // Parent tag was bootstrapped and remembered
    let parent_id = state
        .get(asnsync_core::engine::PARENT_TAG_KEY)
        .await
        .unwrap()
        .expect("parent tag id stored");
    let parent = repository.tag(&parent_id).expect("parent tag exists");
    assert_eq!(parent.name, "MaxMind Data");
    assert_eq!(parent.parent_id, None);

    let google = repository
        .tag(report.buckets[0].tag_id.as_deref().unwrap())
        .expect("bucket tag exists");
    assert_eq!(google.parent_id.as_deref(), Some(parent_id.as_str()));
    assert_eq!(google.members, ranges(&["8.8.8.0/24", "2001:4860::/32"]));
}

#[tokio::test]
async fn reimport_of_same_content_writes_nothing() {
    let records = vec![record("10.0.0.0/8", 64500, "Acme Corp Holdings")];
    let source = MockDatasetSource::new("v1", records.clone());
    let repository = MockTagRepository::new();

    let (engine, _events) = SyncEngine::new(
        Box::new(source.clone()),
        Box::new(repository.clone()),
        Box::new(MemoryStateStore::new()),
        minimal_config(&[("Acme", vec![MatchPattern::keyword("Acme")])]),
    )
    .expect("engine construction succeeds");

    engine.run_once().await.expect("first run succeeds");
    let writes_after_first = repository.write_calls();

    // New fingerprint, identical content
    source.publish("v2", records);
    let report = engine.run_once().await.expect("second run succeeds");

    assert_eq!(
        report.buckets[0].status,
        BucketStatus::Reconciled {
            created: false,
            added: 0,
            removed: 0,
        }
    );
    assert_eq!(repository.write_calls(), writes_after_first);
}
