//! Test doubles and common utilities for architecture contract tests
//!
//! The doubles keep all their state behind `Arc`s so a test can hand a
//! clone to the engine and inspect the original afterwards.

#![allow(dead_code)]

use asnsync_core::config::{
    EngineConfig, MatchPattern, ParentTagConfig, RepositoryConfig, SourceConfig,
    StateStoreConfig, SyncConfig,
};
use asnsync_core::error::{Error, Result};
use asnsync_core::model::{Dataset, RangeRecord, RangeSet, parse_cidr};
use asnsync_core::traits::{DatasetSource, TagRepository};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Build a record from a CIDR string
pub fn record(cidr: &str, asn: u32, organization: &str) -> RangeRecord {
    RangeRecord::new(parse_cidr(cidr).unwrap(), organization).with_asn(asn)
}

/// Build a range set from CIDR strings
pub fn ranges(cidrs: &[&str]) -> RangeSet {
    cidrs.iter().map(|c| parse_cidr(c).unwrap()).collect()
}

/// A dataset source with a settable fingerprint and dataset
#[derive(Clone)]
pub struct MockDatasetSource {
    fingerprint: Arc<Mutex<String>>,
    dataset: Arc<Mutex<Dataset>>,
    fingerprint_calls: Arc<AtomicUsize>,
    fetch_calls: Arc<AtomicUsize>,
}

impl MockDatasetSource {
    pub fn new(fingerprint: &str, records: Vec<RangeRecord>) -> Self {
        Self {
            fingerprint: Arc::new(Mutex::new(fingerprint.to_string())),
            dataset: Arc::new(Mutex::new(Dataset {
                records,
                rejected_rows: 0,
            })),
            fingerprint_calls: Arc::new(AtomicUsize::new(0)),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a new dataset version
    pub fn publish(&self, fingerprint: &str, records: Vec<RangeRecord>) {
        *self.fingerprint.lock().unwrap() = fingerprint.to_string();
        self.dataset.lock().unwrap().records = records;
    }

    pub fn fingerprint_calls(&self) -> usize {
        self.fingerprint_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DatasetSource for MockDatasetSource {
    async fn fetch_fingerprint(&self) -> Result<String> {
        self.fingerprint_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fingerprint.lock().unwrap().clone())
    }

    async fn fetch(&self) -> Result<Dataset> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.dataset.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Clone)]
pub struct MockTag {
    pub name: String,
    pub parent_id: Option<String>,
    pub members: RangeSet,
}

#[derive(Default)]
struct RepositoryState {
    tags: HashMap<String, MockTag>,
    next_id: u64,
    fail_reads: HashSet<String>,
    fail_writes: HashSet<String>,
    reject_credentials: bool,
}

/// An in-memory tag repository that counts calls and fails on request
///
/// Failures are keyed by tag name.
#[derive(Clone, Default)]
pub struct MockTagRepository {
    state: Arc<Mutex<RepositoryState>>,
    connect_calls: Arc<AtomicUsize>,
    read_calls: Arc<AtomicUsize>,
    write_calls: Arc<AtomicUsize>,
    dry_run: Arc<AtomicBool>,
}

impl MockTagRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a tag and return its ID
    pub fn seed_tag(&self, name: &str, parent_id: Option<&str>, members: RangeSet) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = (1000 + state.next_id).to_string();
        state.tags.insert(
            id.clone(),
            MockTag {
                name: name.to_string(),
                parent_id: parent_id.map(str::to_string),
                members,
            },
        );
        id
    }

    pub fn fail_reads_for(&self, name: &str) {
        self.state.lock().unwrap().fail_reads.insert(name.to_string());
    }

    pub fn fail_writes_for(&self, name: &str) {
        self.state.lock().unwrap().fail_writes.insert(name.to_string());
    }

    /// Report dry-run mode to the engine; writes still reach the mock
    pub fn set_dry_run(&self) {
        self.dry_run.store(true, Ordering::SeqCst);
    }

    pub fn reject_credentials(&self) {
        self.state.lock().unwrap().reject_credentials = true;
    }

    /// Members of the tag named `name`, if it exists
    pub fn members_of(&self, name: &str) -> Option<RangeSet> {
        let state = self.state.lock().unwrap();
        state
            .tags
            .values()
            .find(|t| t.name == name)
            .map(|t| t.members.clone())
    }

    pub fn tag(&self, id: &str) -> Option<MockTag> {
        self.state.lock().unwrap().tags.get(id).cloned()
    }

    pub fn tag_count(&self) -> usize {
        self.state.lock().unwrap().tags.len()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.connect_calls() + self.read_calls() + self.write_calls()
    }

    fn check_read(&self, state: &RepositoryState, name: &str) -> Result<()> {
        if state.reject_credentials {
            return Err(Error::auth("session expired"));
        }
        if state.fail_reads.contains(name) {
            return Err(Error::remote_read(format!("read of {} timed out", name)));
        }
        Ok(())
    }

    fn check_write(&self, state: &RepositoryState, name: &str) -> Result<()> {
        if state.reject_credentials {
            return Err(Error::auth("session expired"));
        }
        if state.fail_writes.contains(name) {
            return Err(Error::remote_write(format!("write to {} rejected", name)));
        }
        Ok(())
    }

    fn name_of(state: &RepositoryState, tag_id: &str) -> Result<String> {
        state
            .tags
            .get(tag_id)
            .map(|t| t.name.clone())
            .ok_or_else(|| Error::not_found(format!("tag {}", tag_id)))
    }
}

#[async_trait::async_trait]
impl TagRepository for MockTagRepository {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().unwrap().reject_credentials {
            return Err(Error::auth("invalid username or password"));
        }
        Ok(())
    }

    async fn find_tag(&self, name: &str, parent_id: Option<&str>) -> Result<Option<String>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        self.check_read(&state, name)?;
        Ok(state
            .tags
            .iter()
            .find(|(_, t)| t.name == name && t.parent_id.as_deref() == parent_id)
            .map(|(id, _)| id.clone()))
    }

    async fn create_tag(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        {
            let state = self.state.lock().unwrap();
            self.check_write(&state, name)?;
        }
        Ok(self.seed_tag(name, parent_id, RangeSet::new()))
    }

    async fn get_members(&self, tag_id: &str) -> Result<RangeSet> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let name = Self::name_of(&state, tag_id)?;
        self.check_read(&state, &name)?;
        Ok(state.tags[tag_id].members.clone())
    }

    async fn add_members(&self, tag_id: &str, ranges: &RangeSet) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let name = Self::name_of(&state, tag_id)?;
        self.check_write(&state, &name)?;
        if let Some(tag) = state.tags.get_mut(tag_id) {
            tag.members.extend(ranges.iter().copied());
        }
        Ok(())
    }

    async fn remove_members(&self, tag_id: &str, ranges: &RangeSet) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let name = Self::name_of(&state, tag_id)?;
        self.check_write(&state, &name)?;
        if let Some(tag) = state.tags.get_mut(tag_id) {
            tag.members.retain(|r| !ranges.contains(r));
        }
        Ok(())
    }

    fn repository_name(&self) -> &'static str {
        "mock"
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run.load(Ordering::SeqCst)
    }
}

/// Helper to create a minimal SyncConfig for testing
pub fn minimal_config(buckets: &[(&str, Vec<MatchPattern>)]) -> SyncConfig {
    SyncConfig {
        source: SourceConfig::Maxmind {
            license_key: "test-key".to_string(),
            dataset_url: "https://example.test/asn.zip".to_string(),
            version_url: None,
        },
        repository: RepositoryConfig::Stealthwatch {
            address: "smc.example.test".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            tenant_id: None,
            verify_tls: false,
        },
        state_store: StateStoreConfig::Memory,
        buckets: buckets
            .iter()
            .map(|(name, patterns)| (name.to_string(), patterns.clone()))
            .collect::<BTreeMap<_, _>>(),
        parent_tag: ParentTagConfig::default(),
        engine: EngineConfig {
            interval_secs: None,
            event_channel_capacity: 100,
        },
    }
}
