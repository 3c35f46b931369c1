//! Apexfield HTTP/JSON Gateway.
//!
//! Exposes field definitions, option loading, link resolution, row
//! enrichment and field edits over REST, plus the custom field definition
//! store for admin tooling.

pub mod config;
pub mod error;
pub mod json;
pub mod routes;

pub use config::{Args, GatewayConfig};
pub use error::AppError;

use std::path::Path;
use std::sync::Arc;

use apexfield_core::store::fixture::{install_change_data_type, install_schema_procedures};
use apexfield_core::{FieldService, MemoryStore, RestStore, SharedStore};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Field service over the configured store.
    pub service: Arc<FieldService>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl AppState {
    /// Create new application state.
    pub fn new(service: FieldService, config: GatewayConfig) -> Self {
        Self {
            service: Arc::new(service),
            config,
        }
    }

    /// Build the store named by `config` and a service over it.
    pub async fn from_config(config: GatewayConfig) -> Result<Self, AppError> {
        let store: SharedStore = match &config.fixture {
            Some(path) => Arc::new(load_fixture(path).await?),
            None => Arc::new(RestStore::from_config(&config.core)?),
        };
        let service = FieldService::new(store, config.core.clone());
        Ok(Self::new(service, config))
    }

    /// Name of the backing store, for health reporting.
    pub fn store_kind(&self) -> &'static str {
        if self.config.fixture.is_some() {
            "fixture"
        } else {
            "rest"
        }
    }
}

/// In-memory store seeded from a fixture file, with the definition
/// procedures installed.
pub async fn load_fixture(path: &Path) -> Result<MemoryStore, AppError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Internal(format!("could not read fixture {}: {e}", path.display())))?;
    let document: serde_json::Value = serde_json::from_str(&text)?;
    let store = MemoryStore::from_fixture(document).map_err(|e| AppError::BadRequest(e.to_string()))?;
    install_schema_procedures(&store);
    install_change_data_type(&store);
    info!(fixture = %path.display(), "in-memory store loaded");
    Ok(store)
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::entities::routes())
        .merge(routes::fields::routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}
