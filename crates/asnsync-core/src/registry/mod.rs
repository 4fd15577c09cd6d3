//! Plugin-based component registry
//!
//! The registry lets dataset sources, tag repositories and state stores be
//! registered at startup, so the daemon builds components from configuration
//! without hardcoded if-else chains.
//!
//! ## Registration
//!
//! Implementation crates expose a `register()` function:
//!
//! ```rust,ignore
//! // In asnsync-repo-stealthwatch
//! pub fn register(registry: &SyncRegistry) {
//!     registry.register_repository("stealthwatch", Box::new(StealthwatchFactory));
//! }
//! ```

use crate::config::{RepositoryConfig, SourceConfig, StateStoreConfig};
use crate::error::{Error, Result};
use crate::state::{FileStateStoreFactory, MemoryStateStoreFactory};
use crate::traits::{DatasetSource, StateStore, TagRepository};
use crate::traits::{DatasetSourceFactory, StateStoreFactory, TagRepositoryFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of component factories keyed by type name
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SyncRegistry {
    /// Registered dataset source factories
    sources: RwLock<HashMap<String, Box<dyn DatasetSourceFactory>>>,

    /// Registered tag repository factories
    repositories: RwLock<HashMap<String, Box<dyn TagRepositoryFactory>>>,

    /// Registered state store factories
    state_stores: RwLock<HashMap<String, Arc<dyn StateStoreFactory>>>,
}

impl SyncRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `file` and `memory` state stores registered
    pub fn with_builtin_state_stores() -> Self {
        let registry = Self::new();
        registry.register_state_store("file", Box::new(FileStateStoreFactory));
        registry.register_state_store("memory", Box::new(MemoryStateStoreFactory));
        registry
    }

    /// Register a dataset source factory
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn DatasetSourceFactory>) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Register a tag repository factory
    pub fn register_repository(
        &self,
        name: impl Into<String>,
        factory: Box<dyn TagRepositoryFactory>,
    ) {
        let mut repositories = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        repositories.insert(name.into(), factory);
    }

    /// Register a state store factory
    pub fn register_state_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn StateStoreFactory>,
    ) {
        let mut stores = self
            .state_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create a dataset source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DatasetSource>)`: Created source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn DatasetSource>> {
        let source_type = config.type_name();
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a tag repository from configuration
    pub fn create_repository(&self, config: &RepositoryConfig) -> Result<Box<dyn TagRepository>> {
        let repository_type = config.type_name();
        let repositories = self
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = repositories.get(repository_type).ok_or_else(|| {
            Error::config(format!("Unknown repository type: {}", repository_type))
        })?;

        factory.create(config)
    }

    /// Create a state store from configuration
    pub async fn create_state_store(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
        let store_type = config.type_name();

        // Release the lock before awaiting the factory
        let factory = {
            let stores = self
                .state_stores
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            stores
                .get(store_type)
                .ok_or_else(|| Error::config(format!("Unknown state store type: {}", store_type)))?
                .clone()
        };

        factory.create(config).await
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// List all registered repository types
    pub fn list_repositories(&self) -> Vec<String> {
        let repositories = self
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        repositories.keys().cloned().collect()
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }

    /// Check if a repository type is registered
    pub fn has_repository(&self, name: &str) -> bool {
        let repositories = self
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        repositories.contains_key(name)
    }

    /// Check if a state store type is registered
    pub fn has_state_store(&self, name: &str) -> bool {
        let stores = self
            .state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
