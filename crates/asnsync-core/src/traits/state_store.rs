// # State Store Trait
//
// Defines the interface for persistent state management.
//
// ## Purpose
//
// The state store is a small key/value store that survives restarts. The
// engine keeps in it:
// - `fingerprint`: the fingerprint of the last fully imported dataset
// - `parent_tag_id`: the ID of the parent tag it created
//
// Values are opaque strings; the store never interprets them.
//
// ## Implementations
//
// - File-based: JSON file with atomic writes and backup recovery
// - Memory: for tests and throwaway runs
//
// ## Usage
//
// ```rust,ignore
// use asnsync_core::StateStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* StateStore implementation */;
//
//     let last = store.get("fingerprint").await?;
//     store.set("fingerprint", "0123abcd").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// State record for one key
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    /// The stored value
    pub value: String,
    /// Timestamp of the last write
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl StateRecord {
    /// Create a new state record stamped with the current time
    ///
    /// # Visibility
    ///
    /// This is `pub(crate)` so records are only minted by the store
    /// implementations in this crate.
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            last_updated: chrono::Utc::now(),
        }
    }
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call from any task.
///
/// ## Implementation Guidelines
///
/// - **Async I/O only**: Use async file/database operations
/// - **Explicit flush**: `flush()` must persist all pending changes
/// - **No business logic**: deciding what to store is owned by `SyncEngine`
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the value stored under `key`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(String))`: The stored value
    /// - `Ok(None)`: Nothing stored
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Create or replace the value stored under `key`
    async fn set(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing state stores from configuration
#[async_trait]
pub trait StateStoreFactory: Send + Sync {
    /// Create a StateStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::StateStoreConfig,
    ) -> Result<Box<dyn StateStore>, crate::Error>;
}
