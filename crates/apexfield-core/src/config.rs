//! Core configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default location of the generated data-type sync script.
pub const DEFAULT_MIGRATION_SCRIPT: &str = "migrations/generated/fields-datatype-sync.sql";

/// Default base URL of the administrative query endpoint.
pub const DEFAULT_ADMIN_API_BASE: &str = "https://api.supabase.com";

/// Environment variables consulted, in order, for an administrative credential.
pub const DEFAULT_CREDENTIAL_ENV: &[&str] = &[
    "SUPABASE_ACCESS_TOKEN",
    "SUPABASE_MANAGEMENT_API_TOKEN",
    "SUPABASE_SERVICE_ROLE_KEY",
];

/// Default HTTP timeout for store and administrative requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default status to entity-type mapping table.
pub const DEFAULT_STATUS_MAPPING_TABLE: &str = "status_entity_types";

/// Configuration shared by every core component.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Base URL of the REST store (e.g. `https://abcd.supabase.co`).
    pub rest_url: Option<String>,

    /// Key sent as `apikey` and bearer token to the REST store.
    pub service_key: Option<String>,

    /// Path of the data-type sync script, read at call time.
    pub migration_script: PathBuf,

    /// Base URL of the administrative query endpoint.
    pub admin_api_base: String,

    /// Ordered credential environment variable names.
    pub credential_env: Vec<String>,

    /// HTTP request timeout.
    pub http_timeout: Duration,

    /// Table mapping statuses to the entity types they apply to.
    pub status_mapping_table: String,

    /// Offset applied to local date-time input, in minutes east of UTC.
    pub utc_offset_minutes: i32,
}

impl CoreConfig {
    pub fn new() -> Self {
        Self {
            rest_url: None,
            service_key: None,
            migration_script: PathBuf::from(DEFAULT_MIGRATION_SCRIPT),
            admin_api_base: DEFAULT_ADMIN_API_BASE.to_string(),
            credential_env: DEFAULT_CREDENTIAL_ENV.iter().map(|s| s.to_string()).collect(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            status_mapping_table: DEFAULT_STATUS_MAPPING_TABLE.to_string(),
            utc_offset_minutes: 0,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// `APEXFIELD_*` variables win over the `SUPABASE_*` ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
        };

        let mut config = Self::new();
        config.rest_url = get(&["APEXFIELD_REST_URL", "SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]);
        config.service_key = get(&["APEXFIELD_SERVICE_KEY", "SUPABASE_SERVICE_ROLE_KEY"]);
        if let Some(path) = get(&["APEXFIELD_MIGRATION_SCRIPT"]) {
            config.migration_script = PathBuf::from(path);
        }
        if let Some(base) = get(&["APEXFIELD_ADMIN_API"]) {
            config.admin_api_base = base;
        }
        if let Some(names) = get(&["APEXFIELD_CREDENTIAL_ENV"]) {
            config.credential_env = names
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(secs) = get(&["APEXFIELD_HTTP_TIMEOUT_SECS"]) {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::Config(format!("invalid APEXFIELD_HTTP_TIMEOUT_SECS: {secs}")))?;
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(table) = get(&["APEXFIELD_STATUS_MAPPING_TABLE"]) {
            config.status_mapping_table = table;
        }
        if let Some(offset) = get(&["APEXFIELD_UTC_OFFSET_MINUTES"]) {
            config.utc_offset_minutes = offset.parse().map_err(|_| {
                Error::Config(format!("invalid APEXFIELD_UTC_OFFSET_MINUTES: {offset}"))
            })?;
        }
        Ok(config)
    }

    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    pub fn with_migration_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.migration_script = path.into();
        self
    }

    pub fn with_admin_api_base(mut self, base: impl Into<String>) -> Self {
        self.admin_api_base = base.into();
        self
    }

    pub fn with_credential_env<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credential_env = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_status_mapping_table(mut self, table: impl Into<String>) -> Self {
        self.status_mapping_table = table.into();
        self
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Project reference: the first host label of the REST URL.
    pub fn project_ref(&self) -> Option<String> {
        let url = reqwest::Url::parse(self.rest_url.as_deref()?).ok()?;
        let host = url.host_str()?;
        let (label, _) = host.split_once('.')?;
        if label.is_empty() {
            None
        } else {
            Some(label.to_string())
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
