// # Tag Repository Trait
//
// Defines the interface for reading and updating tag (host group)
// membership on the monitoring platform.
//
// ## Implementations
//
// - Stealthwatch Enterprise: `asnsync-repo-stealthwatch` crate
//
// ## Usage
//
// ```rust,ignore
// use asnsync_core::TagRepository;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let repository = /* TagRepository implementation */;
//     repository.connect().await?;
//
//     let parent = repository.create_tag("MaxMind Data", None).await?;
//     let tag = repository.create_tag("Google", Some(&parent)).await?;
//     let members = repository.get_members(&tag).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::RangeSet;

/// Trait for tag repository implementations
///
/// Each call is one atomic operation on the platform; there is no
/// transaction spanning several tags.
///
/// # Responsibilities
///
/// Repositories translate calls into API requests and nothing else. They do
/// not retry, do not decide what to change, and do not touch the state
/// store; all of that is owned by `SyncEngine`.
///
/// # Error Contract
///
/// - Rejected credentials → `Error::Authentication` (the engine aborts)
/// - Failed reads → `Error::RemoteRead` (the engine skips the bucket)
/// - Failed writes → `Error::RemoteWrite` (the engine records the failure)
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Open a session with the platform
    ///
    /// Called once per run, after the dataset is known to have changed.
    async fn connect(&self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Find a tag by name directly under `parent_id`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(id))`: The tag exists
    /// - `Ok(None)`: No tag with this name under this parent
    /// - `Err(Error)`: If the lookup failed
    async fn find_tag(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, crate::Error>;

    /// Create an empty tag under `parent_id` (top level when `None`)
    ///
    /// # Returns
    ///
    /// The new tag's ID
    async fn create_tag(&self, name: &str, parent_id: Option<&str>)
    -> Result<String, crate::Error>;

    /// Get the current member ranges of a tag
    async fn get_members(&self, tag_id: &str) -> Result<RangeSet, crate::Error>;

    /// Add ranges to a tag
    async fn add_members(&self, tag_id: &str, ranges: &RangeSet) -> Result<(), crate::Error>;

    /// Remove ranges from a tag
    async fn remove_members(&self, tag_id: &str, ranges: &RangeSet)
    -> Result<(), crate::Error>;

    /// Get the repository name (for logging/debugging)
    fn repository_name(&self) -> &'static str;

    /// Whether writes are only logged
    ///
    /// The engine keeps the state store untouched for dry-run repositories,
    /// so a later real run still sees the dataset as new.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Helper trait for constructing tag repositories from configuration
pub trait TagRepositoryFactory: Send + Sync {
    /// Create a TagRepository instance from configuration
    fn create(
        &self,
        config: &crate::config::RepositoryConfig,
    ) -> Result<Box<dyn TagRepository>, crate::Error>;
}
