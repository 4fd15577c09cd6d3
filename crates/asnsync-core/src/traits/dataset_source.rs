// # Dataset Source Trait
//
// Defines the interface for fetching the IP-range-to-organization dataset.
//
// ## Implementations
//
// - MaxMind GeoLite2 ASN CSV: `asnsync-source-maxmind` crate
//
// ## Usage
//
// ```rust,ignore
// use asnsync_core::DatasetSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* DatasetSource implementation */;
//
//     // Cheap check first
//     let fingerprint = source.fetch_fingerprint().await?;
//
//     // Full download only when the fingerprint moved
//     let dataset = source.fetch().await?;
//     println!("{} ranges", dataset.records.len());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::Dataset;

/// Trait for dataset source implementations
///
/// The engine calls `fetch_fingerprint()` on every run and `fetch()` only when the
/// fingerprint differs from the stored one.
///
/// ## Error Contract
///
/// - Unreachable server, bad status, unreadable archive → `Error::Fetch`
///   (the engine aborts the run)
/// - A malformed row is NOT an error of `fetch()`: it is logged, skipped and
///   counted in `Dataset::rejected_rows`
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Get the fingerprint of the currently published dataset
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: An opaque, non-empty content hash
    /// - `Err(Error)`: If the dataset cannot be reached
    async fn fetch_fingerprint(&self) -> Result<String, crate::Error>;

    /// Download and parse the dataset
    ///
    /// # Returns
    ///
    /// - `Ok(Dataset)`: Validated records plus the number of rejected rows
    /// - `Err(Error)`: If the archive cannot be downloaded or unpacked
    async fn fetch(&self) -> Result<Dataset, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing dataset sources from configuration
pub trait DatasetSourceFactory: Send + Sync {
    /// Create a DatasetSource instance from configuration
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn DatasetSource>, crate::Error>;
}
