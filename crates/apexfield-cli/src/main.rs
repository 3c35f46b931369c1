//! Apexfield Command-Line Tool
//!
//! Operator commands for the custom field definition store and the
//! data-type sync migration.

mod commands;
mod executor;
mod formatter;

use std::path::PathBuf;
use std::sync::Arc;

use apexfield_core::store::fixture::{install_change_data_type, install_schema_procedures};
use apexfield_core::{CoreConfig, FieldService, MemoryStore, RestStore, SharedStore};
use clap::Parser;
use commands::Command;
use formatter::OutputFormat;

/// Apexfield Command-Line Tool
#[derive(Parser, Debug)]
#[command(name = "apexfield")]
#[command(version, about = "Manage Apexfield custom fields")]
pub struct Args {
    /// Base URL of the REST store (defaults to the environment)
    #[arg(long)]
    pub rest_url: Option<String>,

    /// Service key for the REST store (defaults to the environment)
    #[arg(long)]
    pub service_key: Option<String>,

    /// Run against an in-memory store seeded from a JSON fixture; writes
    /// are not persisted
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Data-type sync migration script
    #[arg(long)]
    pub migration_script: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "apexfield_cli=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CoreConfig::from_env()?;
    if let Some(url) = args.rest_url {
        config = config.with_rest_url(url);
    }
    if let Some(key) = args.service_key {
        config = config.with_service_key(key);
    }
    if let Some(script) = args.migration_script {
        config = config.with_migration_script(script);
    }

    let store: SharedStore = match &args.fixture {
        Some(path) => {
            let document: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            let store = MemoryStore::from_fixture(document)?;
            install_schema_procedures(&store);
            install_change_data_type(&store);
            Arc::new(store)
        }
        None => Arc::new(RestStore::from_config(&config)?),
    };

    let service = FieldService::new(store, config);
    let formatter = formatter::create_formatter(args.format);
    let output = executor::execute(&service, args.command, &*formatter).await?;
    println!("{}", output);
    Ok(())
}
