// # asnsyncd - ASN Sync Daemon
//
// This is a thin integration layer. Fetching, grouping and reconciliation
// live in asnsync-core; nothing here talks to MaxMind or the SMC directly.
//
// The asnsyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering the dataset source and tag repository
// 4. Running the SyncEngine once, or periodically until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### MaxMind
// - `ASNSYNC_LICENSE_KEY`: MaxMind license key (required)
// - `ASNSYNC_DATASET_URL`: Archive URL override
// - `ASNSYNC_VERSION_URL`: Fingerprint URL override; empty hashes the archive instead
//
// ### Stealthwatch
// - `ASNSYNC_SMC_ADDRESS`: SMC IP address or FQDN
// - `ASNSYNC_SMC_USERNAME` / `ASNSYNC_SMC_PASSWORD`: API credentials
// - `ASNSYNC_TENANT_ID`: Tenant ID (optional, first tenant when unset)
// - `ASNSYNC_VERIFY_TLS`: Validate the SMC certificate (default false)
// - `ASNSYNC_MODE=dry-run`: Log host group changes instead of making them
//
// ### Tags
// - `ASNSYNC_BUCKETS_FILE`: JSON file mapping tag names to match patterns
// - `ASNSYNC_PARENT_TAG_ID`: Existing parent tag (optional)
// - `ASNSYNC_PARENT_TAG_NAME`: Name of the parent tag to create (default "MaxMind Data")
//
// ### State Store
// - `ASNSYNC_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `ASNSYNC_STATE_STORE_PATH`: Path to state file (for file store)
//
// ### Engine
// - `ASNSYNC_INTERVAL_SECS`: Run periodically at this interval; unset runs once
// - `ASNSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// cat > /etc/asnsync/buckets.json <<'EOF'
// { "Google": ["google", {"asn": 15169}], "Amazon": ["amazon"] }
// EOF
//
// export ASNSYNC_LICENSE_KEY=your_key
// export ASNSYNC_SMC_ADDRESS=smc.example.net
// export ASNSYNC_SMC_USERNAME=admin
// export ASNSYNC_SMC_PASSWORD=secret
// export ASNSYNC_BUCKETS_FILE=/etc/asnsync/buckets.json
// export ASNSYNC_STATE_STORE_PATH=/var/lib/asnsync/state.json
//
// asnsyncd
// ```

use anyhow::{Context, Result};
use asnsync_core::config::{
    DEFAULT_MAXMIND_DATASET_URL, DEFAULT_MAXMIND_VERSION_URL, DEFAULT_PARENT_TAG_NAME,
    EngineConfig, MatchPattern, ParentTagConfig, RepositoryConfig, SourceConfig,
    StateStoreConfig, SyncConfig,
};
use asnsync_core::{RunOutcome, SyncEngine, SyncRegistry};
use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Minimum daemon interval; MaxMind limits daily downloads
const MIN_INTERVAL_SECS: u64 = 60;

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown or successful run
/// - 1: Configuration or startup error
/// - 2: Runtime error (run aborted)
/// - 3: Run completed but some buckets failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AsnsyncExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
    BucketFailures = 3,
}

impl From<AsnsyncExitCode> for ExitCode {
    fn from(code: AsnsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    license_key: String,
    dataset_url: Option<String>,
    /// `Some("")` disables the version URL
    version_url: Option<String>,
    smc_address: String,
    smc_username: String,
    smc_password: String,
    tenant_id: Option<String>,
    verify_tls: bool,
    buckets_file: String,
    parent_tag_id: Option<String>,
    parent_tag_name: Option<String>,
    state_store_type: String,
    state_store_path: Option<String>,
    interval_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .with_context(|| format!("{} is required. Set it via: export {}=...", key, key))
        };
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let verify_tls = match lookup("ASNSYNC_VERIFY_TLS") {
            Some(value) => parse_bool("ASNSYNC_VERIFY_TLS", &value)?,
            None => false,
        };

        let interval_secs = optional("ASNSYNC_INTERVAL_SECS")
            .map(|value| {
                value.trim().parse::<u64>().with_context(|| {
                    format!("ASNSYNC_INTERVAL_SECS must be a number of seconds. Got: {}", value)
                })
            })
            .transpose()?;

        Ok(Self {
            license_key: required("ASNSYNC_LICENSE_KEY")?,
            dataset_url: optional("ASNSYNC_DATASET_URL"),
            version_url: lookup("ASNSYNC_VERSION_URL"),
            smc_address: required("ASNSYNC_SMC_ADDRESS")?,
            smc_username: required("ASNSYNC_SMC_USERNAME")?,
            smc_password: required("ASNSYNC_SMC_PASSWORD")?,
            tenant_id: optional("ASNSYNC_TENANT_ID"),
            verify_tls,
            buckets_file: required("ASNSYNC_BUCKETS_FILE")?,
            parent_tag_id: optional("ASNSYNC_PARENT_TAG_ID"),
            parent_tag_name: optional("ASNSYNC_PARENT_TAG_NAME"),
            state_store_type: optional("ASNSYNC_STATE_STORE_TYPE")
                .unwrap_or_else(|| "file".to_string()),
            state_store_path: optional("ASNSYNC_STATE_STORE_PATH"),
            interval_secs,
            log_level: optional("ASNSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks what the environment alone can tell; the assembled
    /// `SyncConfig` is validated again by the core.
    fn validate(&self) -> Result<()> {
        // Check for obvious placeholder keys (common mistake)
        let key_lower = self.license_key.to_lowercase();
        if key_lower.contains("your_key") || key_lower.contains("replace_me") {
            anyhow::bail!(
                "ASNSYNC_LICENSE_KEY appears to be a placeholder. \
                MaxMind license keys are free, register on maxmind.com to get one."
            );
        }

        match self.state_store_type.as_str() {
            "file" => match &self.state_store_path {
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "ASNSYNC_STATE_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
                None => anyhow::bail!(
                    "ASNSYNC_STATE_STORE_PATH is required when ASNSYNC_STATE_STORE_TYPE=file. \
                    Set it via: export ASNSYNC_STATE_STORE_PATH=/var/lib/asnsync/state.json"
                ),
            },
            "memory" => {
                if self.parent_tag_id.is_none() {
                    eprintln!(
                        "WARNING: ASNSYNC_STATE_STORE_TYPE=memory without ASNSYNC_PARENT_TAG_ID. \
                        Every start imports the dataset again and may create a new parent tag."
                    );
                }
            }
            other => anyhow::bail!(
                "ASNSYNC_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        if let Some(interval) = self.interval_secs
            && interval < MIN_INTERVAL_SECS
        {
            anyhow::bail!(
                "ASNSYNC_INTERVAL_SECS must be at least {} seconds. Got: {}",
                MIN_INTERVAL_SECS,
                interval
            );
        }

        log_level(&self.log_level)?;

        Ok(())
    }

    /// Read the bucket file and assemble the engine configuration
    fn to_sync_config(&self) -> Result<SyncConfig> {
        let buckets = load_buckets(&self.buckets_file)?;

        let version_url = match self.version_url.as_deref().map(str::trim) {
            None => Some(DEFAULT_MAXMIND_VERSION_URL.to_string()),
            Some("") => None,
            Some(url) => Some(url.to_string()),
        };

        let state_store = match self.state_store_type.as_str() {
            "memory" => StateStoreConfig::Memory,
            _ => StateStoreConfig::File {
                path: self.state_store_path.clone().unwrap_or_default(),
            },
        };

        let config = SyncConfig {
            source: SourceConfig::Maxmind {
                license_key: self.license_key.clone(),
                dataset_url: self
                    .dataset_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MAXMIND_DATASET_URL.to_string()),
                version_url,
            },
            repository: RepositoryConfig::Stealthwatch {
                address: self.smc_address.clone(),
                username: self.smc_username.clone(),
                password: self.smc_password.clone(),
                tenant_id: self.tenant_id.clone(),
                verify_tls: self.verify_tls,
            },
            state_store,
            buckets,
            parent_tag: ParentTagConfig {
                id: self.parent_tag_id.clone(),
                name: self
                    .parent_tag_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PARENT_TAG_NAME.to_string()),
            },
            engine: EngineConfig {
                interval_secs: self.interval_secs,
                ..EngineConfig::default()
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", key, value),
    }
}

fn log_level(level: &str) -> Result<Level> {
    Ok(match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => anyhow::bail!(
            "ASNSYNC_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    })
}

/// Load the tag name to match pattern map
///
/// ```json
/// { "Google": ["google", {"asn": 15169}] }
/// ```
fn load_buckets(path: &str) -> Result<BTreeMap<String, Vec<MatchPattern>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ASNSYNC_BUCKETS_FILE {}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid bucket file {}: expected {{\"Tag\": [\"keyword\", {{\"asn\": 1}}]}}", path))
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AsnsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return AsnsyncExitCode::ConfigError.into();
    }

    let sync_config = match config.to_sync_config() {
        Ok(sync_config) => sync_config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AsnsyncExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let level = log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AsnsyncExitCode::ConfigError.into();
    }

    info!("Starting asnsyncd");
    info!(
        "Configuration loaded: {} bucket(s), {}",
        sync_config.buckets.len(),
        match sync_config.engine.interval_secs {
            Some(secs) => format!("daemon mode every {} seconds", secs),
            None => "single run".to_string(),
        }
    );

    // Runs are strictly sequential
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AsnsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run(sync_config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Sync failed: {:#}", e);
                AsnsyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Build the components and run the engine
async fn run(config: SyncConfig) -> Result<AsnsyncExitCode> {
    let registry = SyncRegistry::with_builtin_state_stores();

    #[cfg(feature = "maxmind")]
    {
        info!("Registering MaxMind dataset source");
        asnsync_source_maxmind::register(&registry);
    }

    #[cfg(feature = "stealthwatch")]
    {
        info!("Registering Stealthwatch tag repository");
        asnsync_repo_stealthwatch::register(&registry);
    }

    let source = registry.create_source(&config.source)?;
    let repository = registry.create_repository(&config.repository)?;
    let state_store = registry.create_state_store(&config.state_store).await?;

    info!(
        "Source: {}, repository: {}, state store: {}",
        source.source_name(),
        repository.repository_name(),
        config.state_store.type_name()
    );

    let daemon = config.engine.interval_secs.is_some();
    let (engine, mut events) = SyncEngine::new(source, repository, state_store, config)?;

    // Drain engine events; ends when the engine is dropped
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    if daemon {
        engine.run_until(wait_for_shutdown()).await?;
        info!("Shutting down asnsyncd");
        return Ok(AsnsyncExitCode::Success);
    }

    let report = engine.run_once().await?;
    match &report.outcome {
        RunOutcome::Unchanged => info!("Nothing to do"),
        RunOutcome::Imported { fingerprint } => info!(
            "Imported dataset {}: {} bucket(s), {} failed, {} row(s) rejected",
            fingerprint,
            report.buckets.len(),
            report.failure_count(),
            report.rejected_rows
        ),
    }

    if report.has_failures() {
        for bucket in report.buckets.iter().filter(|b| b.is_failure()) {
            warn!("Bucket {} failed: {:?}", bucket.name, bucket.status);
        }
        return Ok(AsnsyncExitCode::BucketFailures);
    }

    Ok(AsnsyncExitCode::Success)
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to setup signal handlers: {}. Falling back to Ctrl-C", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to wait for Ctrl-C: {}", e);
                }
                return;
            }
        };

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!("Received shutdown signal: {}", signal);
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal: SIGINT"),
        Err(e) => error!("Failed to wait for Ctrl-C: {}", e),
    }
}
