//! Configuration types for the ASN sync system
//!
//! This module defines all configuration structures used throughout the
//! workspace. A `SyncConfig` value is built once by the caller and handed to
//! the engine; nothing here is global.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default name of the parent tag created on first import
pub const DEFAULT_PARENT_TAG_NAME: &str = "MaxMind Data";

/// MaxMind GeoLite2 ASN CSV archive
pub const DEFAULT_MAXMIND_DATASET_URL: &str =
    "https://download.maxmind.com/app/geoip_download?edition_id=GeoLite2-ASN-CSV&suffix=zip";

/// MD5 of the MaxMind archive, used as the dataset fingerprint
pub const DEFAULT_MAXMIND_VERSION_URL: &str =
    "https://download.maxmind.com/app/geoip_download?edition_id=GeoLite2-ASN-CSV&suffix=zip.md5";

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Dataset source configuration
    pub source: SourceConfig,

    /// Tag repository configuration
    pub repository: RepositoryConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Tag buckets to maintain, keyed by tag name
    pub buckets: BTreeMap<String, Vec<MatchPattern>>,

    /// Parent tag under which bucket tags live
    #[serde(default)]
    pub parent_tag: ParentTagConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.buckets.is_empty() {
            return Err(crate::Error::config("No buckets configured"));
        }

        for (name, patterns) in &self.buckets {
            if name.trim().is_empty() {
                return Err(crate::Error::config("Bucket name cannot be empty"));
            }
            if patterns.is_empty() {
                return Err(crate::Error::config(format!(
                    "Bucket '{}' has no match patterns",
                    name
                )));
            }
        }

        if self.parent_tag.name.trim().is_empty() {
            return Err(crate::Error::config("Parent tag name cannot be empty"));
        }

        self.source.validate()?;
        self.repository.validate()?;
        self.state_store.validate()?;

        Ok(())
    }
}

/// A single match rule of a bucket
///
/// In JSON a plain string is a keyword and `{"asn": 15169}` is an ASN rule:
///
/// ```json
/// { "Google": ["google", {"asn": 15169}] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchPattern {
    /// Case-insensitive substring of the organization name
    Keyword(String),
    /// Exact autonomous system number
    Asn {
        /// Autonomous system number
        asn: u32,
    },
}

impl MatchPattern {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self::Keyword(keyword.into())
    }

    pub fn asn(asn: u32) -> Self {
        Self::Asn { asn }
    }
}

/// Dataset source configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// MaxMind GeoLite2 ASN CSV archive
    Maxmind {
        /// License key appended to every request
        license_key: String,
        /// Archive URL
        #[serde(default = "default_dataset_url")]
        dataset_url: String,
        /// Fingerprint URL; when absent the archive itself is hashed
        #[serde(default = "default_version_url")]
        version_url: Option<String>,
    },

    /// Custom dataset source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

// Secrets and opaque custom configs never appear in Debug output
impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceConfig::Maxmind {
                dataset_url,
                version_url,
                ..
            } => f
                .debug_struct("Maxmind")
                .field("license_key", &"<REDACTED>")
                .field("dataset_url", dataset_url)
                .field("version_url", version_url)
                .finish(),
            SourceConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<REDACTED>")
                .finish(),
        }
    }
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Maxmind {
                license_key,
                dataset_url,
                version_url,
            } => {
                if license_key.is_empty() {
                    return Err(crate::Error::config(
                        "A MaxMind license key is required. They are free, register on maxmind.com to get one",
                    ));
                }
                validate_url("dataset URL", dataset_url)?;
                if let Some(url) = version_url {
                    validate_url("version URL", url)?;
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                validate_custom("source", factory, config)
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Maxmind { .. } => "maxmind",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Tag repository configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepositoryConfig {
    /// Stealthwatch Management Console REST API
    Stealthwatch {
        /// SMC IP address or FQDN
        address: String,
        /// API user
        username: String,
        /// API password
        password: String,
        /// Tenant (domain) ID; the first tenant is used when absent
        #[serde(default)]
        tenant_id: Option<String>,
        /// Validate the SMC certificate
        #[serde(default)]
        verify_tls: bool,
    },

    /// Custom repository
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryConfig::Stealthwatch {
                address,
                username,
                tenant_id,
                verify_tls,
                ..
            } => f
                .debug_struct("Stealthwatch")
                .field("address", address)
                .field("username", username)
                .field("password", &"<REDACTED>")
                .field("tenant_id", tenant_id)
                .field("verify_tls", verify_tls)
                .finish(),
            RepositoryConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<REDACTED>")
                .finish(),
        }
    }
}

impl RepositoryConfig {
    /// Validate the repository configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RepositoryConfig::Stealthwatch {
                address,
                username,
                password,
                ..
            } => {
                if address.trim().is_empty() {
                    return Err(crate::Error::config("Stealthwatch address cannot be empty"));
                }
                if username.is_empty() {
                    return Err(crate::Error::config("Stealthwatch username cannot be empty"));
                }
                if password.is_empty() {
                    return Err(crate::Error::config("Stealthwatch password cannot be empty"));
                }
                Ok(())
            }
            RepositoryConfig::Custom { factory, config } => {
                validate_custom("repository", factory, config)
            }
        }
    }

    /// Get the repository type name
    pub fn type_name(&self) -> &str {
        match self {
            RepositoryConfig::Stealthwatch { .. } => "stealthwatch",
            RepositoryConfig::Custom { factory, .. } => factory,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,

    /// Custom state store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("State file path cannot be empty"));
                }
                Ok(())
            }
            StateStoreConfig::Memory => Ok(()),
            StateStoreConfig::Custom { factory, config } => {
                validate_custom("state store", factory, config)
            }
        }
    }

    /// Get the state store type name
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
            StateStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Parent tag settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentTagConfig {
    /// Existing parent tag ID; overrides the stored one
    #[serde(default)]
    pub id: Option<String>,

    /// Name used when the parent tag has to be created
    #[serde(default = "default_parent_tag_name")]
    pub name: String,
}

impl Default for ParentTagConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: default_parent_tag_name(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between runs in daemon mode; `None` runs once
    #[serde(default)]
    pub interval_secs: Option<u64>,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn validate_url(what: &str, url: &str) -> Result<(), crate::Error> {
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "MaxMind {} must use HTTP or HTTPS scheme. Got: {}",
            what, url
        )));
    }
    Ok(())
}

fn validate_custom(
    kind: &str,
    factory: &str,
    config: &serde_json::Value,
) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} factory cannot be empty",
            kind
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {} config cannot be null",
            kind
        )));
    }
    Ok(())
}

fn default_dataset_url() -> String {
    DEFAULT_MAXMIND_DATASET_URL.to_string()
}

fn default_version_url() -> Option<String> {
    Some(DEFAULT_MAXMIND_VERSION_URL.to_string())
}

fn default_parent_tag_name() -> String {
    DEFAULT_PARENT_TAG_NAME.to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}
