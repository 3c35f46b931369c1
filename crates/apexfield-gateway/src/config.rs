//! Gateway configuration.

use std::path::PathBuf;
use std::time::Duration;

use apexfield_core::config::{DEFAULT_MIGRATION_SCRIPT, DEFAULT_STATUS_MAPPING_TABLE};
use apexfield_core::CoreConfig;
use clap::Parser;

/// Apexfield HTTP/JSON Gateway command line arguments.
#[derive(Debug, Parser)]
#[command(name = "apexfield-gateway")]
#[command(about = "HTTP/JSON gateway for Apexfield field definitions and row enrichment")]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, default_value = "0.0.0.0:8080", env = "APEXFIELD_LISTEN")]
    pub listen: String,

    /// Base URL of the REST store.
    #[arg(long, env = "APEXFIELD_REST_URL")]
    pub rest_url: Option<String>,

    /// Service key for the REST store.
    #[arg(long, env = "APEXFIELD_SERVICE_KEY", hide_env_values = true)]
    pub service_key: Option<String>,

    /// Serve from an in-memory store seeded with this JSON fixture instead
    /// of the REST store.
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Data-type sync script applied when the change procedure is missing.
    #[arg(long, default_value = DEFAULT_MIGRATION_SCRIPT, env = "APEXFIELD_MIGRATION_SCRIPT")]
    pub migration_script: PathBuf,

    /// Table mapping statuses to entity types.
    #[arg(long, default_value = DEFAULT_STATUS_MAPPING_TABLE, env = "APEXFIELD_STATUS_MAPPING_TABLE")]
    pub status_mapping_table: String,

    /// Offset of local date-time input, in minutes east of UTC.
    #[arg(long, default_value_t = 0, env = "APEXFIELD_UTC_OFFSET_MINUTES", allow_hyphen_values = true)]
    pub utc_offset_minutes: i32,

    /// Store request timeout (ms).
    #[arg(long, default_value_t = 30_000)]
    pub http_timeout_ms: u64,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,
    /// Fixture file for the in-memory store.
    pub fixture: Option<PathBuf>,
    /// Configuration handed to the core.
    pub core: CoreConfig,
}

impl From<&Args> for GatewayConfig {
    fn from(args: &Args) -> Self {
        let mut core = CoreConfig::new()
            .with_migration_script(args.migration_script.clone())
            .with_status_mapping_table(args.status_mapping_table.clone())
            .with_utc_offset_minutes(args.utc_offset_minutes)
            .with_http_timeout(Duration::from_millis(args.http_timeout_ms));
        if let Some(url) = &args.rest_url {
            core = core.with_rest_url(url.clone());
        }
        if let Some(key) = &args.service_key {
            core = core.with_service_key(key.clone());
        }

        Self {
            listen_addr: args.listen.clone(),
            fixture: args.fixture.clone(),
            core,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            fixture: None,
            core: CoreConfig::default(),
        }
    }
}
