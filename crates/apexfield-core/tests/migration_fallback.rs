//! Data-type changes against deployments that lack the change procedure.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use apexfield_core::definition::MigrationStrategy;
use apexfield_core::store::fixture::{install_change_data_type, install_schema_procedures, CHANGE_DATA_TYPE};
use apexfield_core::{CoreConfig, DataType, DefinitionStore, Error, MemoryStore, MigrationChain, NewField};
use async_trait::async_trait;
use pretty_assertions::assert_eq;

/// Applies the script by installing the missing procedure.
struct Installs {
    store: Arc<MemoryStore>,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl MigrationStrategy for Installs {
    fn name(&self) -> String {
        "installer".to_string()
    }

    async fn apply(&self, sql: &str) -> Result<(), String> {
        assert!(sql.contains("schema_change_field_data_type"));
        self.runs.fetch_add(1, Ordering::SeqCst);
        install_change_data_type(&self.store);
        Ok(())
    }
}

/// Reports success without changing anything.
struct NoOp;

#[async_trait]
impl MigrationStrategy for NoOp {
    fn name(&self) -> String {
        "no-op".to_string()
    }

    async fn apply(&self, _sql: &str) -> Result<(), String> {
        Ok(())
    }
}

struct Rejects(&'static str);

#[async_trait]
impl MigrationStrategy for Rejects {
    fn name(&self) -> String {
        format!("rejects-{}", self.0)
    }

    async fn apply(&self, _sql: &str) -> Result<(), String> {
        Err(format!("{} refused the script", self.0))
    }
}

struct TestContext {
    memory: Arc<MemoryStore>,
    _script: tempfile::NamedTempFile,
    field_id: i64,
    definitions: DefinitionStore,
}

impl TestContext {
    async fn new<F>(chain: F) -> Self
    where
        F: FnOnce(MigrationChain, Arc<MemoryStore>) -> MigrationChain,
    {
        let mut script = tempfile::NamedTempFile::new().unwrap();
        script
            .write_all(b"create or replace function schema_change_field_data_type() returns void;")
            .unwrap();

        let memory = Arc::new(MemoryStore::new());
        install_schema_procedures(&memory);
        let chain = chain(MigrationChain::new(script.path()), memory.clone());
        let definitions = DefinitionStore::new(memory.clone(), CoreConfig::new()).with_migration(chain);
        let field_id = definitions
            .create(NewField::new("Bid", "bid").with_entities(["task"]))
            .await
            .unwrap();

        Self {
            memory,
            _script: script,
            field_id,
            definitions,
        }
    }
}

#[tokio::test]
async fn test_migration_runs_once_then_retry_succeeds() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let ctx = TestContext::new(move |chain, memory| {
        chain
            .with_strategy(Arc::new(Rejects("exec_sql")))
            .with_strategy(Arc::new(Installs { store: memory, runs: counter }))
    })
    .await;

    ctx.definitions.change_data_type(ctx.field_id, "number").await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.memory.calls_to(CHANGE_DATA_TYPE), 2);
    let fields = ctx.definitions.runtime_fields("task").await.unwrap();
    assert_eq!(fields[0].data_type, DataType::Number);

    // installed now: no second migration
    ctx.definitions.change_data_type(ctx.field_id, "text").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.memory.calls_to(CHANGE_DATA_TYPE), 3);
}

#[tokio::test]
async fn test_retry_failure_names_both_errors() {
    let ctx = TestContext::new(|chain, _| {
        chain
            .with_strategy(Arc::new(Rejects("sql")))
            .with_strategy(Arc::new(NoOp))
    })
    .await;

    let err = ctx.definitions.change_data_type(ctx.field_id, "number").await.unwrap_err();

    let Error::Migration(migration) = &err else {
        panic!("expected a migration error, got {err:?}");
    };
    assert_eq!(migration.applied.as_deref(), Some("no-op"));
    assert!(migration.primary.contains(CHANGE_DATA_TYPE));
    assert!(migration.retry.as_deref().unwrap_or_default().contains(CHANGE_DATA_TYPE));
    let text = err.to_string();
    assert!(text.contains("migration applied via no-op"));
    assert!(text.contains("retry failed"));
    assert_eq!(migration.attempts.len(), 1);
    assert!(text.contains("rejects-sql: sql refused the script"));
    // exactly one retry
    assert_eq!(ctx.memory.calls_to(CHANGE_DATA_TYPE), 2);
}

#[tokio::test]
async fn test_every_strategy_failing_is_reported() {
    let ctx = TestContext::new(|chain, _| {
        chain
            .with_strategy(Arc::new(Rejects("sql")))
            .with_strategy(Arc::new(Rejects("admin")))
    })
    .await;

    let err = ctx.definitions.change_data_type(ctx.field_id, "number").await.unwrap_err();

    let text = err.to_string();
    assert!(text.contains("migration could not be applied"));
    assert!(text.contains("rejects-sql: sql refused the script"));
    assert!(text.contains("rejects-admin: admin refused the script"));
    // no retry without an applied migration
    assert_eq!(ctx.memory.calls_to(CHANGE_DATA_TYPE), 1);
}

#[tokio::test]
async fn test_invalid_data_type_never_calls_the_store() {
    let ctx = TestContext::new(|chain, _| chain.with_strategy(Arc::new(NoOp))).await;

    let err = ctx.definitions.change_data_type(ctx.field_id, "   ").await.unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(ctx.memory.calls_to(CHANGE_DATA_TYPE), 0);
}
