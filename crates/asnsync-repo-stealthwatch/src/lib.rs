// # Stealthwatch Tag Repository
//
// This crate provides the Stealthwatch Enterprise (SMC) implementation of
// `TagRepository`. Tags are SMC host groups.
//
// ## Behavior
//
// - One HTTP request per operation, plus one GET before each membership PUT
// - No retry, no backoff, no caching of tag contents (owned by SyncEngine)
// - HTTP timeout configured (30 seconds)
// - Status codes mapped to the core error taxonomy (401/403 are fatal)
// - Dry-run mode: reads are performed, write payloads are only logged
//
// ## Security Requirements
//
// - The password NEVER appears in logs or `Debug` output
// - Credentials are provided via environment variables only
// - Certificate validation is off unless `verify_tls` is set, since SMC
//   appliances usually run self-signed certificates
//
// ## API Reference
//
// - Login: POST `/token/v2/authenticate` (form `username`, `password`);
//   the session is a cookie and `XSRF-TOKEN` must be echoed as `X-XSRF-TOKEN`
// - Tenants: GET `/sw-reporting/v1/tenants/`
// - List tags: GET `/smc-configuration/rest/v1/tenants/:tenant/tags/`
// - Get tag: GET `/smc-configuration/rest/v1/tenants/:tenant/tags/:id`
// - Create tags: POST `/smc-configuration/rest/v1/tenants/:tenant/tags/`
// - Update tag: PUT `/smc-configuration/rest/v1/tenants/:tenant/tags/:id`

use async_trait::async_trait;
use asnsync_core::config::RepositoryConfig;
use asnsync_core::model::{RangeSet, parse_cidr};
use asnsync_core::traits::{TagRepository, TagRepositoryFactory};
use asnsync_core::{Error, Result, SyncRegistry};
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cookie carrying the anti-CSRF token
const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// Header the token is echoed in
const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Parent ID the SMC uses for top-level host groups
const TOP_LEVEL_PARENT_ID: &str = "0";

/// Prefix of the placeholder IDs handed out in dry-run mode
const DRY_RUN_ID_PREFIX: &str = "dry-run-";

/// Established session state
#[derive(Debug, Clone)]
struct Session {
    tenant_id: String,
    xsrf_token: Option<String>,
}

/// Stealthwatch tag repository
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the repository will:
/// - Log in and perform all GET requests
/// - Log the intended POST/PUT payloads
/// - **NOT** actually create or modify host groups
///
/// # Security
///
/// The Debug implementation does NOT expose the password.
pub struct StealthwatchRepository {
    /// `https://<address>`
    base_url: String,

    username: String,

    /// API password
    /// ⚠️ NEVER log this value
    password: String,

    /// Configured tenant; discovered on connect when `None`
    tenant_id: Option<String>,

    /// HTTP client with a cookie store
    client: reqwest::Client,

    dry_run: bool,

    session: RwLock<Option<Session>>,

    /// Counter for dry-run placeholder IDs
    dry_run_ids: AtomicU64,
}

impl std::fmt::Debug for StealthwatchRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StealthwatchRepository")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("tenant_id", &self.tenant_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl StealthwatchRepository {
    /// Create a new Stealthwatch repository
    ///
    /// # Parameters
    ///
    /// - `address`: SMC IP address or FQDN; a full `http(s)://` URL is kept as is
    /// - `username` / `password`: API credentials
    /// - `tenant_id`: Tenant (domain) ID, or `None` to use the first tenant
    /// - `verify_tls`: Validate the SMC certificate
    /// - `dry_run`: If true, perform reads but skip writes
    pub fn new(
        address: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        tenant_id: Option<String>,
        verify_tls: bool,
        dry_run: bool,
    ) -> Result<Self> {
        let address = address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(Error::config("Stealthwatch address cannot be empty"));
        }

        let password = password.into();
        if password.is_empty() {
            return Err(Error::config("Stealthwatch password cannot be empty"));
        }

        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("https://{}", address)
        };

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .cookie_store(true)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            username: username.into(),
            password,
            tenant_id,
            client,
            dry_run,
            session: RwLock::new(None),
            dry_run_ids: AtomicU64::new(0),
        })
    }

    async fn session(&self) -> Result<Session> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::auth("Not logged in to Stealthwatch; call connect() first"))
    }

    fn tags_url(&self, session: &Session) -> String {
        format!(
            "{}/smc-configuration/rest/v1/tenants/{}/tags/",
            self.base_url, session.tenant_id
        )
    }

    fn request(&self, method: Method, url: &str, session: &Session) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &session.xsrf_token {
            Some(token) => builder.header(XSRF_HEADER, token),
            None => builder,
        }
    }

    /// Find the first tenant visible to the API user
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /sw-reporting/v1/tenants/
    /// ```
    async fn discover_tenant(&self, xsrf_token: Option<String>) -> Result<String> {
        let discovery = Session {
            tenant_id: String::new(),
            xsrf_token,
        };
        let url = format!("{}/sw-reporting/v1/tenants/", self.base_url);

        let response = self
            .request(Method::GET, &url, &discovery)
            .send()
            .await
            .map_err(|e| Error::remote_read(format!("HTTP request failed: {}", e)))?;
        let json = check_response(response, "Tenant lookup", Error::remote_read).await?;

        let tenant = json["data"]
            .as_array()
            .and_then(|tenants| tenants.first())
            .and_then(|tenant| id_string(&tenant["id"]))
            .ok_or_else(|| Error::not_found("Stealthwatch reported no tenants"))?;

        tracing::info!("Using Stealthwatch tenant {}", tenant);
        Ok(tenant)
    }

    /// Get one host group
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /smc-configuration/rest/v1/tenants/:tenant/tags/:id
    /// ```
    async fn get_tag(&self, session: &Session, tag_id: &str) -> Result<Value> {
        let url = format!("{}{}", self.tags_url(session), tag_id);

        let response = self
            .request(Method::GET, &url, session)
            .send()
            .await
            .map_err(|e| Error::remote_read(format!("HTTP request failed: {}", e)))?;
        let mut json = check_response(response, "Tag lookup", Error::remote_read).await?;

        match json.get_mut("data").map(Value::take) {
            Some(tag) if tag.is_object() => Ok(tag),
            _ => Err(Error::remote_read(format!(
                "Invalid response format for tag {}: data is not an object",
                tag_id
            ))),
        }
    }

    /// Replace a host group with `tag`
    ///
    /// # API Call
    ///
    /// ```http
    /// PUT /smc-configuration/rest/v1/tenants/:tenant/tags/:id
    /// { "id": ..., "name": ..., "ranges": [...], ... }
    /// ```
    async fn put_tag(&self, session: &Session, tag_id: &str, tag: &Value) -> Result<()> {
        let url = format!("{}{}", self.tags_url(session), tag_id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send PUT request to {} with payload: {}", url, tag);
            return Ok(());
        }

        let response = self
            .request(Method::PUT, &url, session)
            .json(tag)
            .send()
            .await
            .map_err(|e| Error::remote_write(format!("HTTP request failed: {}", e)))?;
        check_response(response, "Tag update", Error::remote_write).await?;

        tracing::debug!("Tag {} updated", tag_id);
        Ok(())
    }

    /// Read a tag, edit its range list and write it back
    async fn update_ranges<F>(&self, tag_id: &str, edit: F) -> Result<()>
    where
        F: FnOnce(Vec<String>) -> Vec<String>,
    {
        if tag_id.starts_with(DRY_RUN_ID_PREFIX) {
            tracing::info!("[DRY-RUN] Would update ranges of new tag {}", tag_id);
            return Ok(());
        }

        let session = self.session().await?;
        let mut tag = self.get_tag(&session, tag_id).await?;

        let ranges = edit(range_strings(&tag));
        tag["ranges"] = json!(ranges);

        self.put_tag(&session, tag_id, &tag).await
    }
}

#[async_trait]
impl TagRepository for StealthwatchRepository {
    /// Log in and resolve the tenant
    ///
    /// # API Calls
    ///
    /// ```http
    /// POST /token/v2/authenticate
    /// Content-Type: application/x-www-form-urlencoded
    ///
    /// username=...&password=...
    /// ```
    async fn connect(&self) -> Result<()> {
        tracing::info!(
            "Logging in to Stealthwatch at {} as {} [mode: {}]",
            self.base_url,
            self.username,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let url = format!("{}/token/v2/authenticate", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::auth(format!("Stealthwatch login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::auth(format!(
                "Stealthwatch login failed: invalid credentials or insufficient permissions. Status: {}",
                status
            )));
        }

        let xsrf_token = response
            .cookies()
            .find(|cookie| cookie.name() == XSRF_COOKIE)
            .map(|cookie| cookie.value().to_string());
        if xsrf_token.is_none() {
            tracing::debug!("No {} cookie in login response", XSRF_COOKIE);
        }

        let tenant_id = match &self.tenant_id {
            Some(tenant_id) => tenant_id.clone(),
            None => self.discover_tenant(xsrf_token.clone()).await?,
        };

        *self.session.write().await = Some(Session {
            tenant_id,
            xsrf_token,
        });
        Ok(())
    }

    /// # API Calls
    ///
    /// ```http
    /// GET /smc-configuration/rest/v1/tenants/:tenant/tags/
    /// # only for same-named tags whose summary lacks parentId
    /// GET /smc-configuration/rest/v1/tenants/:tenant/tags/:id
    /// ```
    async fn find_tag(&self, name: &str, parent_id: Option<&str>) -> Result<Option<String>> {
        let session = self.session().await?;
        let expected_parent = parent_id.unwrap_or(TOP_LEVEL_PARENT_ID);

        let response = self
            .request(Method::GET, &self.tags_url(&session), &session)
            .send()
            .await
            .map_err(|e| Error::remote_read(format!("HTTP request failed: {}", e)))?;
        let json = check_response(response, "Tag listing", Error::remote_read).await?;

        let tags = json["data"].as_array().ok_or_else(|| {
            Error::remote_read("Invalid response format: data is not an array")
        })?;

        for tag in tags.iter().filter(|tag| tag["name"].as_str() == Some(name)) {
            let Some(id) = id_string(&tag["id"]) else {
                continue;
            };

            let parent = match id_string(&tag["parentId"]) {
                Some(parent) => parent,
                None => {
                    let detail = self.get_tag(&session, &id).await?;
                    id_string(&detail["parentId"]).unwrap_or_default()
                }
            };

            if parent == expected_parent {
                tracing::debug!("Found tag {} ({}) under {}", name, id, expected_parent);
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    /// # API Call
    ///
    /// ```http
    /// POST /smc-configuration/rest/v1/tenants/:tenant/tags/
    /// [{ "name": ..., "location": "OUTSIDE", "ranges": [], "parentId": ... }]
    /// ```
    async fn create_tag(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        let session = self.session().await?;
        let url = self.tags_url(&session);

        let payload = json!([{
            "name": name,
            "location": "OUTSIDE",
            "description": "Imported from MaxMind ASN data",
            "ranges": [],
            "hostBaselines": false,
            "suppressExcludedServices": true,
            "inverseSuppression": false,
            "hostTrap": false,
            "sendToCta": false,
            "parentId": id_value(parent_id.unwrap_or(TOP_LEVEL_PARENT_ID)),
        }]);

        if self.dry_run {
            let id = format!(
                "{}{}",
                DRY_RUN_ID_PREFIX,
                self.dry_run_ids.fetch_add(1, Ordering::Relaxed) + 1
            );
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {} (placeholder id {})",
                url,
                payload,
                id
            );
            return Ok(id);
        }

        let response = self
            .request(Method::POST, &url, &session)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::remote_write(format!("HTTP request failed: {}", e)))?;
        let json = check_response(response, "Tag creation", Error::remote_write).await?;

        let id = json["data"]
            .as_array()
            .and_then(|tags| tags.first())
            .and_then(|tag| id_string(&tag["id"]))
            .ok_or_else(|| {
                Error::remote_write("Invalid response format: data[0].id is missing")
            })?;

        tracing::info!("Created tag {} ({})", name, id);
        Ok(id)
    }

    async fn get_members(&self, tag_id: &str) -> Result<RangeSet> {
        if tag_id.starts_with(DRY_RUN_ID_PREFIX) {
            return Ok(RangeSet::new());
        }

        let session = self.session().await?;
        let tag = self.get_tag(&session, tag_id).await?;

        let mut members = RangeSet::new();
        for range in range_strings(&tag) {
            match parse_cidr(&range) {
                Ok(cidr) => {
                    members.insert(cidr);
                }
                Err(e) => tracing::warn!("Ignoring range of tag {}: {}", tag_id, e),
            }
        }
        Ok(members)
    }

    async fn add_members(&self, tag_id: &str, ranges: &RangeSet) -> Result<()> {
        tracing::debug!("Adding {} range(s) to tag {}", ranges.len(), tag_id);
        self.update_ranges(tag_id, |mut current| {
            let present: RangeSet = current.iter().filter_map(|r| parse_cidr(r).ok()).collect();
            current.extend(
                ranges
                    .iter()
                    .filter(|range| !present.contains(range))
                    .map(ToString::to_string),
            );
            current
        })
        .await
    }

    async fn remove_members(&self, tag_id: &str, ranges: &RangeSet) -> Result<()> {
        tracing::debug!("Removing {} range(s) from tag {}", ranges.len(), tag_id);
        self.update_ranges(tag_id, |mut current| {
            current.retain(|range| match parse_cidr(range) {
                Ok(cidr) => !ranges.contains(&cidr),
                Err(_) => true,
            });
            current
        })
        .await
    }

    fn repository_name(&self) -> &'static str {
        "stealthwatch"
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Map a non-success status to the core error taxonomy and parse the body
///
/// `kind` builds the error for everything except rejected credentials.
async fn check_response(
    response: reqwest::Response,
    context: &str,
    kind: fn(String) -> Error,
) -> Result<Value> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        return Err(match status.as_u16() {
            401 | 403 => Error::auth(format!(
                "{} failed: session rejected or insufficient permissions. Status: {}",
                context, status
            )),
            404 => kind(format!("{} failed: not found. Status: {}", context, status)),
            409 => kind(format!(
                "{} failed: conflict with an existing host group - {}",
                context, error_text
            )),
            429 => kind(format!(
                "{} failed: rate limit exceeded. Status: {}",
                context, status
            )),
            500..=599 => kind(format!(
                "{} failed: SMC server error (transient): {} - {}",
                context, status, error_text
            )),
            _ => kind(format!("{} failed: {} - {}", context, status, error_text)),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| kind(format!("{}: failed to read response: {}", context, e)))?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| kind(format!("{}: failed to parse response: {}", context, e)))
}

/// SMC IDs are numbers; accept strings too
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Send numeric IDs as numbers
fn id_value(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

fn range_strings(tag: &Value) -> Vec<String> {
    tag["ranges"]
        .as_array()
        .map(|ranges| {
            ranges
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Factory for creating Stealthwatch repositories
pub struct StealthwatchFactory;

impl TagRepositoryFactory for StealthwatchFactory {
    fn create(&self, config: &RepositoryConfig) -> Result<Box<dyn TagRepository>> {
        match config {
            RepositoryConfig::Stealthwatch {
                address,
                username,
                password,
                tenant_id,
                verify_tls,
            } => {
                if username.is_empty() || password.is_empty() {
                    return Err(Error::config("Stealthwatch username and password are required"));
                }

                // Check for dry-run mode environment variable
                let dry_run = std::env::var("ASNSYNC_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "Stealthwatch repository running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(StealthwatchRepository::new(
                    address,
                    username.clone(),
                    password.clone(),
                    tenant_id.clone(),
                    *verify_tls,
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Stealthwatch repository")),
        }
    }
}

/// Register the Stealthwatch repository with a registry
///
/// # Example
///
/// ```rust
/// use asnsync_core::SyncRegistry;
///
/// let registry = SyncRegistry::new();
/// asnsync_repo_stealthwatch::register(&registry);
/// assert!(registry.has_repository("stealthwatch"));
/// ```
pub fn register(registry: &SyncRegistry) {
    registry.register_repository("stealthwatch", Box::new(StealthwatchFactory));
}
