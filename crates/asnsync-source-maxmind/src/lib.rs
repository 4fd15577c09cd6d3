// # MaxMind Dataset Source
//
// This crate provides the MaxMind GeoLite2 ASN CSV dataset source.
//
// ## Fetch Flow
//
// 1. `fetch_fingerprint()`: GET the version URL (the MD5 MaxMind publishes
//    next to the archive). Without a version URL the archive is downloaded
//    and its SHA-256 is the fingerprint; the bytes are kept for `fetch()`.
// 2. `fetch()`: download the zip, read every `.csv` entry
//    (`GeoLite2-ASN-Blocks-IPv4.csv`, `GeoLite2-ASN-Blocks-IPv6.csv`) and
//    validate each row into a `RangeRecord`.
//
// ## CSV Layout
//
// ```text
// network,autonomous_system_number,autonomous_system_organization
// 1.0.0.0/24,13335,CLOUDFLARENET
// ```
//
// Malformed rows are logged, counted and skipped. Organization names are not
// always valid UTF-8; such fields are read as Latin-1.
//
// ## Security Requirements
//
// - The license key NEVER appears in logs or error messages
// - reqwest errors are stripped of their URL, which carries the key

use async_trait::async_trait;
use asnsync_core::config::SourceConfig;
use asnsync_core::model::{Dataset, RangeRecord};
use asnsync_core::traits::{DatasetSource, DatasetSourceFactory};
use asnsync_core::{Error, Result, SyncRegistry};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::io::{Cursor, Read};
use std::time::Duration;
use tokio::sync::Mutex;

/// HTTP timeout; the archive is several megabytes
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// MaxMind GeoLite2 ASN dataset source
///
/// # Security
///
/// The Debug implementation does NOT expose the license key.
pub struct MaxmindSource {
    /// MaxMind license key
    /// ⚠️ NEVER log this value
    license_key: String,

    /// Archive URL (without license key)
    dataset_url: String,

    /// Fingerprint URL (without license key)
    version_url: Option<String>,

    client: reqwest::Client,

    /// Archive downloaded while fingerprinting, consumed by the next `fetch()`
    cached_archive: Mutex<Option<Vec<u8>>>,
}

impl std::fmt::Debug for MaxmindSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxmindSource")
            .field("license_key", &"<REDACTED>")
            .field("dataset_url", &self.dataset_url)
            .field("version_url", &self.version_url)
            .finish()
    }
}

impl MaxmindSource {
    /// Create a new MaxMind source
    ///
    /// # Parameters
    ///
    /// - `license_key`: MaxMind license key, sent as the `license_key` query parameter
    /// - `dataset_url`: URL of the zipped CSV archive
    /// - `version_url`: URL returning the archive fingerprint; `None` hashes the archive
    pub fn new(
        license_key: impl Into<String>,
        dataset_url: impl Into<String>,
        version_url: Option<String>,
    ) -> Result<Self> {
        let license_key = license_key.into();
        if license_key.is_empty() {
            return Err(Error::config("MaxMind license key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            license_key,
            dataset_url: dataset_url.into(),
            version_url,
            client,
            cached_archive: Mutex::new(None),
        })
    }

    /// GET a MaxMind URL with the license key attached
    async fn download(&self, url: &str, what: &str) -> Result<Vec<u8>> {
        tracing::debug!("Fetching MaxMind {} from {}", what, url);

        let response = self
            .client
            .get(url)
            .query(&[("license_key", &self.license_key)])
            .send()
            .await
            .map_err(|e| {
                Error::fetch(format!("MaxMind {} request failed: {}", what, e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => Error::fetch(format!(
                    "MaxMind rejected the license key while fetching the {}. Status: {}",
                    what, status
                )),
                404 => Error::fetch(format!("MaxMind {} not found: {}", what, url)),
                429 => Error::fetch(format!(
                    "MaxMind download limit reached. Status: {}",
                    status
                )),
                _ => Error::fetch(format!("Failed to fetch MaxMind {}: {}", what, status)),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            Error::fetch(format!(
                "Failed to read MaxMind {}: {}",
                what,
                e.without_url()
            ))
        })?;

        Ok(bytes.to_vec())
    }

    async fn download_archive(&self) -> Result<Vec<u8>> {
        let archive = self.download(&self.dataset_url, "dataset").await?;
        tracing::info!("Downloaded MaxMind archive ({} bytes)", archive.len());
        Ok(archive)
    }
}

#[async_trait]
impl DatasetSource for MaxmindSource {
    async fn fetch_fingerprint(&self) -> Result<String> {
        if let Some(version_url) = &self.version_url {
            let body = self.download(version_url, "version").await?;
            let fingerprint = decode_field(&body).trim().to_string();
            if fingerprint.is_empty() {
                return Err(Error::fetch("MaxMind returned an empty version"));
            }
            tracing::debug!("MaxMind dataset version: {}", fingerprint);
            return Ok(fingerprint);
        }

        let archive = self.download_archive().await?;
        let fingerprint = sha256_hex(&archive);
        *self.cached_archive.lock().await = Some(archive);
        Ok(fingerprint)
    }

    async fn fetch(&self) -> Result<Dataset> {
        let cached = self.cached_archive.lock().await.take();
        let archive = match cached {
            Some(archive) => archive,
            None => self.download_archive().await?,
        };

        let dataset = parse_archive(&archive)?;
        tracing::info!(
            "Parsed {} range(s) from MaxMind archive, rejected {} row(s)",
            dataset.records.len(),
            dataset.rejected_rows
        );
        Ok(dataset)
    }

    fn source_name(&self) -> &'static str {
        "maxmind"
    }
}

/// Hex SHA-256 of a byte slice
fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Read every CSV entry of a MaxMind zip archive
///
/// # Returns
///
/// - `Ok(Dataset)`: Records of all CSV entries, in archive order
/// - `Err(Error::Fetch)`: If the bytes are not a zip or hold no CSV file
pub fn parse_archive(bytes: &[u8]) -> Result<Dataset> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        Error::fetch(format!(
            "Failed to unzip the MaxMind archive (check the license key): {}",
            e
        ))
    })?;

    let mut dataset = Dataset::default();
    let mut csv_files = 0;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::fetch(format!("Failed to read archive entry {}: {}", index, e)))?;

        if !entry.is_file() || !entry.name().ends_with(".csv") {
            continue;
        }

        let name = entry.name().to_string();
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| Error::fetch(format!("Failed to extract {}: {}", name, e)))?;

        tracing::debug!("Reading {} ({} bytes)", name, content.len());
        parse_csv(&name, &content, &mut dataset);
        csv_files += 1;
    }

    if csv_files == 0 {
        return Err(Error::fetch("MaxMind archive contains no CSV files"));
    }

    Ok(dataset)
}

/// Parse one CSV file into `dataset`
///
/// The first line is a header. Rows that fail validation are logged and
/// counted in `rejected_rows`.
pub fn parse_csv(name: &str, content: &[u8], dataset: &mut Dataset) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    for (index, result) in reader.byte_records().enumerate() {
        // Line 1 is the header
        let fallback_row = index + 2;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("{}: skipping unreadable row {}: {}", name, fallback_row, e);
                dataset.rejected_rows += 1;
                continue;
            }
        };

        let line = row
            .position()
            .map_or(fallback_row, |position| position.line() as usize);

        if row.len() < 3 {
            tracing::warn!(
                "{}: skipping row {}: expected 3 columns, found {}",
                name,
                line,
                row.len()
            );
            dataset.rejected_rows += 1;
            continue;
        }

        match RangeRecord::from_fields(
            line,
            &decode_field(&row[0]),
            &decode_field(&row[1]),
            &decode_field(&row[2]),
        ) {
            Ok(record) => dataset.records.push(record),
            Err(e) => {
                tracing::warn!("{}: {}", name, e);
                dataset.rejected_rows += 1;
            }
        }
    }
}

/// UTF-8 if valid, otherwise Latin-1
fn decode_field(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Factory for creating MaxMind sources
pub struct MaxmindFactory;

impl DatasetSourceFactory for MaxmindFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DatasetSource>> {
        match config {
            SourceConfig::Maxmind {
                license_key,
                dataset_url,
                version_url,
            } => {
                if license_key.is_empty() {
                    return Err(Error::config("MaxMind license key is required"));
                }

                Ok(Box::new(MaxmindSource::new(
                    license_key.clone(),
                    dataset_url.clone(),
                    version_url.clone(),
                )?))
            }
            _ => Err(Error::config("Invalid config for MaxMind source")),
        }
    }
}

/// Register the MaxMind source with a registry
///
/// # Example
///
/// ```rust
/// use asnsync_core::SyncRegistry;
///
/// let registry = SyncRegistry::new();
/// asnsync_source_maxmind::register(&registry);
/// assert!(registry.has_source("maxmind"));
/// ```
pub fn register(registry: &SyncRegistry) {
    registry.register_source("maxmind", Box::new(MaxmindFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IPV4_CSV: &str = "network,autonomous_system_number,autonomous_system_organization\n\
        1.0.0.0/24,13335,CLOUDFLARENET\n\
        8.8.8.0/24,15169,GOOGLE\n\
        not-a-cidr,15169,GOOGLE\n\
        34.0.0.0/15,,\"Google Cloud, LLC\"\n";

    const IPV6_CSV: &str = "network,autonomous_system_number,autonomous_system_organization\n\
        2001:4860::/32,15169,GOOGLE\n\
        2600::/48,abc,Sprint\n";

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();

        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
        }

        writer.finish().unwrap().into_inner()
    }

    fn sample_archive() -> Vec<u8> {
        build_zip(&[
            ("GeoLite2-ASN-CSV_20250107/", b""),
            ("GeoLite2-ASN-CSV_20250107/LICENSE.txt", b"license text"),
            (
                "GeoLite2-ASN-CSV_20250107/GeoLite2-ASN-Blocks-IPv4.csv",
                IPV4_CSV.as_bytes(),
            ),
            (
                "GeoLite2-ASN-CSV_20250107/GeoLite2-ASN-Blocks-IPv6.csv",
                IPV6_CSV.as_bytes(),
            ),
        ])
    }

    #[test]
    fn test_parse_archive_reads_all_csv_entries() {
        let dataset = parse_archive(&sample_archive()).unwrap();

        let cidrs: Vec<String> = dataset.records.iter().map(|r| r.cidr().to_string()).collect();
        assert_eq!(
            cidrs,
            vec!["1.0.0.0/24", "8.8.8.0/24", "34.0.0.0/15", "2001:4860::/32"]
        );
        assert_eq!(dataset.rejected_rows, 2);

        let google_cloud = &dataset.records[2];
        assert_eq!(google_cloud.organization(), "Google Cloud, LLC");
        assert_eq!(google_cloud.asn(), None);
        assert_eq!(dataset.records[1].asn(), Some(15169));
    }

    #[test]
    fn test_parse_archive_without_csv_fails() {
        let archive = build_zip(&[("README.txt", b"nothing here")]);
        assert!(matches!(parse_archive(&archive), Err(Error::Fetch(_))));
    }

    #[test]
    fn test_parse_archive_rejects_garbage() {
        let result = parse_archive(b"<html>Invalid license key</html>");
        assert!(matches!(result, Err(Error::Fetch(_))));
    }

    #[test]
    fn test_latin1_organization() {
        let mut content = b"network,autonomous_system_number,autonomous_system_organization\n".to_vec();
        content.extend_from_slice(b"5.0.0.0/16,3215,Soci\xe9t\xe9 G\xe9n\xe9rale\n");

        let mut dataset = Dataset::default();
        parse_csv("blocks.csv", &content, &mut dataset);

        assert_eq!(dataset.rejected_rows, 0);
        assert_eq!(dataset.records[0].organization(), "Société Générale");
    }

    #[test]
    fn test_short_row_is_rejected() {
        let content = b"network,autonomous_system_number,autonomous_system_organization\n\
            10.0.0.0/8,64500\n\
            192.0.2.0/24,64501,Example\n";

        let mut dataset = Dataset::default();
        parse_csv("blocks.csv", content, &mut dataset);

        assert_eq!(dataset.rejected_rows, 1);
        assert_eq!(dataset.records.len(), 1);
    }

    #[test]
    fn test_license_key_not_exposed_in_debug() {
        let source = MaxmindSource::new("secret_key_12345", "https://example.test/a.zip", None)
            .unwrap();

        let debug_str = format!("{:?}", source);
        assert!(!debug_str.contains("secret_key_12345"));
        assert!(debug_str.contains("MaxmindSource"));
    }

    #[test]
    fn test_factory() {
        let factory = MaxmindFactory;

        let config = SourceConfig::Maxmind {
            license_key: "key".to_string(),
            dataset_url: "https://example.test/a.zip".to_string(),
            version_url: None,
        };
        assert!(factory.create(&config).is_ok());

        let config = SourceConfig::Maxmind {
            license_key: String::new(),
            dataset_url: "https://example.test/a.zip".to_string(),
            version_url: None,
        };
        assert!(factory.create(&config).is_err());
    }

    #[tokio::test]
    async fn test_fingerprint_from_version_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .and(query_param("license_key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("5c8ab1cbd2bd1ce9\n"))
            .expect(1)
            .mount(&server)
            .await;

        let source = MaxmindSource::new(
            "key",
            format!("{}/archive", server.uri()),
            Some(format!("{}/version?edition_id=GeoLite2-ASN-CSV", server.uri())),
        )
        .unwrap();

        assert_eq!(source.fetch_fingerprint().await.unwrap(), "5c8ab1cbd2bd1ce9");
    }

    #[tokio::test]
    async fn test_fingerprint_from_archive_hash_downloads_once() {
        let server = MockServer::start().await;
        let archive = sample_archive();
        Mock::given(method("GET"))
            .and(path("/archive"))
            .and(query_param("license_key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let source = MaxmindSource::new("key", format!("{}/archive", server.uri()), None).unwrap();

        let fingerprint = source.fetch_fingerprint().await.unwrap();
        assert_eq!(fingerprint, sha256_hex(&archive));
        assert_eq!(fingerprint.len(), 64);

        // Served from the archive kept by fetch_fingerprint()
        let dataset = source.fetch().await.unwrap();
        assert_eq!(dataset.records.len(), 4);
    }

    #[tokio::test]
    async fn test_rejected_license_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid license key"))
            .mount(&server)
            .await;

        let source = MaxmindSource::new(
            "secret_key_12345",
            format!("{}/archive", server.uri()),
            Some(format!("{}/version", server.uri())),
        )
        .unwrap();

        let err = source.fetch_fingerprint().await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert!(!err.to_string().contains("secret_key_12345"));
        assert!(err.is_fatal());
    }
}
