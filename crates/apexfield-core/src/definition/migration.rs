//! Data-type migration fallback.
//!
//! When the data-type change procedure is not installed, the generated sync
//! script is applied through an ordered chain of strategies. The first one
//! that succeeds wins; every failure is kept so the final error can name each
//! attempt.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::store::SharedStore;

/// Procedure used to run raw SQL through the store.
pub const EXEC_SQL: &str = "exec_sql";

/// One way of applying the migration script.
#[async_trait]
pub trait MigrationStrategy: Send + Sync {
    /// Name used in logs and in aggregated errors.
    fn name(&self) -> String;

    /// Apply `sql`. The error text is retained verbatim.
    async fn apply(&self, sql: &str) -> std::result::Result<(), String>;
}

/// Runs the script through the store's `exec_sql` procedure.
///
/// Deployments disagree on the argument name, so the chain carries one
/// strategy per name.
pub struct ExecSqlStrategy {
    store: SharedStore,
    argument: &'static str,
}

impl ExecSqlStrategy {
    pub fn new(store: SharedStore, argument: &'static str) -> Self {
        Self { store, argument }
    }
}

#[async_trait]
impl MigrationStrategy for ExecSqlStrategy {
    fn name(&self) -> String {
        format!("{EXEC_SQL}({})", self.argument)
    }

    async fn apply(&self, sql: &str) -> std::result::Result<(), String> {
        let mut args = serde_json::Map::new();
        args.insert(self.argument.to_string(), json!(sql));
        self.store
            .call(EXEC_SQL, serde_json::Value::Object(args))
            .await
            .map(|_| ())
            .map_err(|e| e.message)
    }
}

/// Posts the script to the administrative query endpoint.
pub struct AdminApiStrategy {
    http: Client,
    endpoint: String,
    credential_name: String,
    token: String,
}

impl AdminApiStrategy {
    pub fn new(
        http: Client,
        base: &str,
        project_ref: &str,
        credential_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}/v1/projects/{}/database/query",
                base.trim_end_matches('/'),
                project_ref
            ),
            credential_name: credential_name.into(),
            token: token.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MigrationStrategy for AdminApiStrategy {
    fn name(&self) -> String {
        format!("management API ({})", self.credential_name)
    }

    async fn apply(&self, sql: &str) -> std::result::Result<(), String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "query": sql }))
            .send()
            .await
            .map_err(|e| format!("management API request failed: {e}"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let body = if body.trim().is_empty() { "no response body".to_string() } else { body };
        Err(format!("management API failed ({}): {}", status.as_u16(), body))
    }
}

/// Placeholder recording why no administrative strategy could be built.
pub struct UnavailableStrategy {
    name: String,
    reason: String,
}

impl UnavailableStrategy {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MigrationStrategy for UnavailableStrategy {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn apply(&self, _sql: &str) -> std::result::Result<(), String> {
        Err(self.reason.clone())
    }
}

/// A failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Result of a chain run that applied the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationApplied {
    /// Strategy that applied the script.
    pub strategy: String,
    /// Strategies that failed before it, in order.
    pub failures: Vec<StrategyFailure>,
}

/// Ordered strategies plus the script they apply.
pub struct MigrationChain {
    script: PathBuf,
    strategies: Vec<Arc<dyn MigrationStrategy>>,
}

impl fmt::Debug for MigrationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationChain")
            .field("script", &self.script)
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl MigrationChain {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn MigrationStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Standard chain read from the process environment.
    pub fn from_config(store: SharedStore, config: &CoreConfig) -> Self {
        Self::from_lookup(store, config, |key| std::env::var(key).ok())
    }

    /// Standard chain: `exec_sql(sql)`, `exec_sql(query)`, then the
    /// administrative endpoint once per non-empty credential, in the
    /// configured order.
    pub fn from_lookup<F>(store: SharedStore, config: &CoreConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut chain = Self::new(config.migration_script.clone())
            .with_strategy(Arc::new(ExecSqlStrategy::new(store.clone(), "sql")))
            .with_strategy(Arc::new(ExecSqlStrategy::new(store, "query")));

        let credentials: Vec<(String, String)> = config
            .credential_env
            .iter()
            .filter_map(|name| {
                lookup(name)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (name.clone(), v))
            })
            .collect();
        let project_ref = config.project_ref();

        let http = Client::builder().timeout(config.http_timeout).build();
        match (project_ref, credentials.is_empty(), http) {
            (Some(project_ref), false, Ok(http)) => {
                for (name, token) in credentials {
                    chain = chain.with_strategy(Arc::new(AdminApiStrategy::new(
                        http.clone(),
                        &config.admin_api_base,
                        &project_ref,
                        name,
                        token,
                    )));
                }
            }
            (project_ref, no_credentials, http) => {
                let reason = if let Err(e) = http {
                    format!("failed to create HTTP client: {e}")
                } else if no_credentials {
                    format!("no credential set (tried {})", config.credential_env.join(", "))
                } else if project_ref.is_none() {
                    "project reference could not be derived from the REST URL".to_string()
                } else {
                    "unavailable".to_string()
                };
                chain = chain.with_strategy(Arc::new(UnavailableStrategy::new("management API", reason)));
            }
        }
        chain
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Read the script and try each strategy in order.
    ///
    /// Returns the strategy that applied it with the failures before it, or
    /// every failure.
    pub async fn run(&self) -> std::result::Result<MigrationApplied, Vec<StrategyFailure>> {
        let sql = match tokio::fs::read_to_string(&self.script).await {
            Ok(sql) => sql,
            Err(e) => {
                warn!(script = %self.script.display(), error = %e, "migration script unreadable");
                return Err(vec![StrategyFailure {
                    strategy: "read script".to_string(),
                    reason: format!("could not read migration file ({}): {e}", self.script.display()),
                }]);
            }
        };

        let mut failures = Vec::new();
        for strategy in &self.strategies {
            let name = strategy.name();
            debug!(strategy = %name, "applying migration script");
            match strategy.apply(&sql).await {
                Ok(()) => {
                    info!(strategy = %name, script = %self.script.display(), "migration script applied");
                    return Ok(MigrationApplied {
                        strategy: name,
                        failures,
                    });
                }
                Err(reason) => {
                    warn!(strategy = %name, %reason, "migration strategy failed");
                    failures.push(StrategyFailure { strategy: name, reason });
                }
            }
        }
        Err(failures)
    }
}

/// Every remediation for a missing procedure failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationError {
    /// Procedure that was missing.
    pub procedure: String,
    /// Error from the first call.
    pub primary: String,
    /// Failed strategies, in order.
    pub attempts: Vec<StrategyFailure>,
    /// Strategy that applied the script, when one did.
    pub applied: Option<String>,
    /// Error from the retry, when the script applied but the retry failed.
    pub retry: Option<String>,
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is missing ({})", self.procedure, self.primary)?;
        match (&self.applied, &self.retry) {
            (Some(applied), Some(retry)) => {
                write!(f, "; migration applied via {applied} but the retry failed: {retry}")?;
            }
            _ => {
                f.write_str("; migration could not be applied")?;
            }
        }
        if !self.attempts.is_empty() {
            let attempts: Vec<String> = self.attempts.iter().map(ToString::to_string).collect();
            write!(f, "; attempts: {}", attempts.join(" | "))?;
        }
        Ok(())
    }
}

impl std::error::Error for MigrationError {}
