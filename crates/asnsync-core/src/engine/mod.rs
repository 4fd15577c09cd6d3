//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Gating every run on the dataset fingerprint
//! - Bootstrapping the parent tag
//! - Grouping the dataset into buckets
//! - Reconciling each bucket against its tag's current membership
//! - Persisting state after a fully successful import
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  fingerprint / dataset  ┌──────────────┐
//! │ DatasetSource │────────────────────────▶│  SyncEngine  │
//! └───────────────┘                         └──────────────┘
//!                                                  │
//!         ┌────────────────────────────────────────┼──────────────────────┐
//!         ▼                                        ▼                      ▼
//! ┌──────────────┐                        ┌───────────────┐        ┌────────────┐
//! │  StateStore  │                        │ TagRepository │        │   Events   │
//! │ (fingerprint)│                        │ (find/create/ │        │  (notify)  │
//! └──────────────┘                        │  add/remove)  │        └────────────┘
//!                                         └───────────────┘
//! ```
//!
//! ## Run Flow
//!
//! 1. Fetch the dataset fingerprint, compare with the stored one
//! 2. Unchanged: stop, no further calls of any kind
//! 3. Connect to the repository, resolve the parent tag
//! 4. Fetch and group the dataset
//! 5. Per bucket: find or create the tag, read members, add, remove
//! 6. Store the fingerprint if no bucket failed
//!
//! ## Failure Handling
//!
//! Runs are sequential and never retried by the engine. Fatal errors (see
//! [`Error::is_fatal`]) abort the run. A failed membership read skips the
//! bucket; a failed write marks it failed; either way the next bucket is
//! processed and the failure appears in the [`SyncReport`].

use crate::change::{FINGERPRINT_KEY, has_changed};
use crate::config::{MatchPattern, ParentTagConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::grouping::group_records;
use crate::model::{RangeSet, TagBucket};
use crate::reconcile::reconcile;
use crate::traits::{DatasetSource, StateStore, TagRepository};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// State store key holding the ID of the parent tag
pub const PARENT_TAG_KEY: &str = "parent_tag_id";

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A run started
    RunStarted { buckets: usize },

    /// The published dataset is already imported
    DatasetUnchanged { fingerprint: String },

    /// The dataset was downloaded and parsed
    DatasetFetched {
        records: usize,
        rejected_rows: usize,
    },

    /// A bucket's tag now matches the dataset
    BucketReconciled {
        bucket: String,
        added: usize,
        removed: usize,
    },

    /// A bucket was skipped because its tag could not be read
    BucketSkipped { bucket: String, error: String },

    /// A write to a bucket's tag failed
    BucketFailed { bucket: String, error: String },

    /// A run completed (possibly with bucket failures)
    RunFinished { failures: usize },

    /// Daemon loop stopped
    Stopped { reason: String },
}

/// Overall result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Fingerprint matched the stored one; nothing was done
    Unchanged,
    /// A new dataset was reconciled into the tags
    Imported { fingerprint: String },
}

/// Per-bucket result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketStatus {
    /// Tag now matches the bucket
    Reconciled {
        /// The tag did not exist and was created
        created: bool,
        added: usize,
        removed: usize,
    },
    /// Membership (or the tag itself) could not be read
    ReadFailed { error: String },
    /// Creating or updating the tag failed
    WriteFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    pub name: String,
    pub tag_id: Option<String>,
    pub status: BucketStatus,
}

impl BucketReport {
    pub fn is_failure(&self) -> bool {
        !matches!(self.status, BucketStatus::Reconciled { .. })
    }
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: RunOutcome,
    pub rejected_rows: usize,
    pub buckets: Vec<BucketReport>,
}

impl SyncReport {
    fn unchanged() -> Self {
        Self {
            outcome: RunOutcome::Unchanged,
            rejected_rows: 0,
            buckets: Vec::new(),
        }
    }

    /// Number of buckets that were skipped or failed
    pub fn failure_count(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Either call [`SyncEngine::run_once()`] for a single import, or
///    [`SyncEngine::run()`] / [`SyncEngine::run_until()`] to repeat runs at
///    the configured interval
///
/// All remote calls are awaited one after another; the engine never runs
/// two operations at once.
pub struct SyncEngine {
    /// Dataset source
    source: Box<dyn DatasetSource>,

    /// Tag repository
    repository: Box<dyn TagRepository>,

    /// State store for the fingerprint and parent tag
    state_store: Box<dyn StateStore>,

    /// Bucket name to match patterns
    buckets: BTreeMap<String, Vec<MatchPattern>>,

    /// Parent tag settings
    parent_tag: ParentTagConfig,

    /// Pause between runs in daemon mode
    interval: Option<Duration>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn DatasetSource>,
        repository: Box<dyn TagRepository>,
        state_store: Box<dyn StateStore>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity.max(1));

        let engine = Self {
            source,
            repository,
            state_store,
            buckets: config.buckets,
            parent_tag: config.parent_tag,
            interval: config.engine.interval_secs.map(Duration::from_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Perform a single import
    ///
    /// # Returns
    ///
    /// - `Ok(SyncReport)`: The run completed; check `has_failures()`
    /// - `Err(Error)`: The run aborted on a fatal error
    pub async fn run_once(&self) -> Result<SyncReport> {
        self.emit_event(SyncEvent::RunStarted {
            buckets: self.buckets.len(),
        });

        let fingerprint = self.source.fetch_fingerprint().await?;
        let fingerprint = fingerprint.trim().to_string();
        let stored = self.state_store.get(FINGERPRINT_KEY).await?;

        if !has_changed(&fingerprint, stored.as_deref())? {
            info!("Last imported data is up-to-date ({})", fingerprint);
            self.emit_event(SyncEvent::DatasetUnchanged { fingerprint });
            return Ok(SyncReport::unchanged());
        }

        info!(
            "Dataset changed ({} -> {}), importing from {}",
            stored.as_deref().unwrap_or("none"),
            fingerprint,
            self.source.source_name()
        );

        self.repository.connect().await?;
        let parent_id = self.resolve_parent_tag().await?;

        let dataset = self.source.fetch().await?;
        info!(
            "Fetched {} range(s), rejected {} row(s)",
            dataset.records.len(),
            dataset.rejected_rows
        );
        self.emit_event(SyncEvent::DatasetFetched {
            records: dataset.records.len(),
            rejected_rows: dataset.rejected_rows,
        });

        let buckets = group_records(&dataset.records, &self.buckets);

        let mut reports = Vec::with_capacity(buckets.len());
        for bucket in &buckets {
            reports.push(self.sync_bucket(bucket, &parent_id).await?);
        }

        let report = SyncReport {
            outcome: RunOutcome::Imported {
                fingerprint: fingerprint.clone(),
            },
            rejected_rows: dataset.rejected_rows,
            buckets: reports,
        };

        let failures = report.failure_count();
        if failures > 0 {
            warn!(
                "{} bucket(s) failed; fingerprint not stored so the next run retries",
                failures
            );
        } else if self.repository.is_dry_run() {
            info!("Dry-run: fingerprint {} not stored", fingerprint);
        } else {
            self.state_store.set(FINGERPRINT_KEY, &fingerprint).await?;
            info!("Dataset {} successfully imported", fingerprint);
        }
        self.state_store.flush().await?;

        self.emit_event(SyncEvent::RunFinished { failures });
        Ok(report)
    }

    /// Repeat runs at the configured interval until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
    }

    /// Repeat runs at the configured interval until `shutdown` completes
    ///
    /// A failed run is logged and the loop continues. Shutdown is checked
    /// between runs; a run in progress always completes.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let interval = self
            .interval
            .ok_or_else(|| Error::config("Daemon mode requires engine.interval_secs"))?;

        tokio::pin!(shutdown);

        loop {
            match self.run_once().await {
                Ok(report) => debug!(
                    "Run finished: {:?}, {} failure(s)",
                    report.outcome,
                    report.failure_count()
                ),
                Err(e) => error!("Sync run failed: {}", e),
            }

            info!("Waiting {} seconds...", interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(SyncEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        self.state_store.flush().await?;
        info!("State flushed, engine stopped");
        Ok(())
    }

    /// Find the parent tag: configured ID, stored ID, existing top-level tag
    /// with the configured name, or a newly created one
    async fn resolve_parent_tag(&self) -> Result<String> {
        if let Some(id) = &self.parent_tag.id {
            return Ok(id.clone());
        }

        if let Some(id) = self.state_store.get(PARENT_TAG_KEY).await? {
            debug!("Using stored parent tag {}", id);
            return Ok(id);
        }

        let id = match self.repository.find_tag(&self.parent_tag.name, None).await? {
            Some(id) => {
                info!("Found existing parent tag {} ({})", self.parent_tag.name, id);
                id
            }
            None => {
                let id = self.repository.create_tag(&self.parent_tag.name, None).await?;
                info!("Created parent tag {} ({})", self.parent_tag.name, id);
                id
            }
        };

        if !self.repository.is_dry_run() {
            self.state_store.set(PARENT_TAG_KEY, &id).await?;
        }
        Ok(id)
    }

    /// Bring one tag in line with its bucket
    ///
    /// Only fatal errors are returned; everything else becomes a failed
    /// `BucketReport`.
    async fn sync_bucket(&self, bucket: &TagBucket, parent_id: &str) -> Result<BucketReport> {
        let existing = match self.repository.find_tag(&bucket.name, Some(parent_id)).await {
            Ok(existing) => existing,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(self.read_failed(bucket, None, e)),
        };

        let (tag_id, created, current) = match existing {
            Some(tag_id) => match self.repository.get_members(&tag_id).await {
                Ok(current) => (tag_id, false, current),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(self.read_failed(bucket, Some(tag_id), e)),
            },
            None => {
                info!("Creating tag for {}...", bucket.name);
                match self.repository.create_tag(&bucket.name, Some(parent_id)).await {
                    Ok(tag_id) => (tag_id, true, RangeSet::new()),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => return Ok(self.write_failed(bucket, None, e)),
                }
            }
        };

        let delta = reconcile(&bucket.members, &current);
        if delta.is_empty() {
            debug!("Tag {} ({}) already up-to-date", bucket.name, tag_id);
        } else {
            info!("Updating tag {} ({}): {}", bucket.name, tag_id, delta);
        }

        if !delta.to_add.is_empty() {
            match self.repository.add_members(&tag_id, &delta.to_add).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(self.write_failed(bucket, Some(tag_id), e)),
            }
        }

        if !delta.to_remove.is_empty() {
            match self.repository.remove_members(&tag_id, &delta.to_remove).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(self.write_failed(bucket, Some(tag_id), e)),
            }
        }

        self.emit_event(SyncEvent::BucketReconciled {
            bucket: bucket.name.clone(),
            added: delta.to_add.len(),
            removed: delta.to_remove.len(),
        });

        Ok(BucketReport {
            name: bucket.name.clone(),
            tag_id: Some(tag_id),
            status: BucketStatus::Reconciled {
                created,
                added: delta.to_add.len(),
                removed: delta.to_remove.len(),
            },
        })
    }

    fn read_failed(&self, bucket: &TagBucket, tag_id: Option<String>, e: Error) -> BucketReport {
        warn!("Skipping bucket {}: {}", bucket.name, e);
        self.emit_event(SyncEvent::BucketSkipped {
            bucket: bucket.name.clone(),
            error: e.to_string(),
        });
        BucketReport {
            name: bucket.name.clone(),
            tag_id,
            status: BucketStatus::ReadFailed {
                error: e.to_string(),
            },
        }
    }

    fn write_failed(&self, bucket: &TagBucket, tag_id: Option<String>, e: Error) -> BucketReport {
        error!("Failed to update bucket {}: {}", bucket.name, e);
        self.emit_event(SyncEvent::BucketFailed {
            bucket: bucket.name.clone(),
            error: e.to_string(),
        });
        BucketReport {
            name: bucket.name.clone(),
            tag_id,
            status: BucketStatus::WriteFailed {
                error: e.to_string(),
            },
        }
    }

    /// Emit an engine event, dropping it when the channel is full
    fn emit_event(&self, event: SyncEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Event channel full, dropping {:?}. Consider increasing event_channel_capacity.",
                    event
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!("Event receiver dropped, discarding {:?}", event);
            }
        }
    }
}
