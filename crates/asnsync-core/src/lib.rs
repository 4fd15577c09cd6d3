// # asnsync-core
//
// Core library for syncing ASN range data into monitoring-platform tags.
//
// ## Architecture Overview
//
// - **DatasetSource**: Trait for fetching the range dataset and its fingerprint
// - **TagRepository**: Trait for reading and updating tag membership
// - **StateStore**: Trait for persistent key/value state (fingerprint, parent tag)
// - **SyncEngine**: Orchestrates fingerprint check → grouping → reconciliation
// - **SyncRegistry**: Plugin-based registry for sources, repositories and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Pure Core**: Change detection, grouping and reconciliation do no I/O
// 3. **Plugin-Based**: Components are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: A second run against unchanged data makes no writes

pub mod change;
pub mod config;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    MatchPattern, ParentTagConfig, RepositoryConfig, SourceConfig, StateStoreConfig, SyncConfig,
};
pub use engine::{BucketReport, BucketStatus, RunOutcome, SyncEngine, SyncEvent, SyncReport};
pub use error::{Error, Result};
pub use model::{Dataset, RangeRecord, RangeSet, ReconciliationDelta, TagBucket};
pub use registry::SyncRegistry;
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DatasetSource, StateStore, TagRepository};
