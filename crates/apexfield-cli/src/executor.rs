//! Command execution.

use apexfield_core::{AttachOptions, FieldPatch, FieldService, MigrationChain, NewField};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::commands::{Command, CreateArgs};
use crate::formatter::Formatter;

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Error from the field core.
    #[error(transparent)]
    Core(#[from] apexfield_core::Error),

    /// The standalone migration failed on every strategy.
    #[error("migration failed: {0}")]
    Migration(String),
}

/// Execute a command and return formatted output.
pub async fn execute(
    service: &FieldService,
    command: Command,
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    let definitions = service.definitions();
    match command {
        Command::ListFields { entity_type } => {
            let fields = definitions.list_fields(entity_type.as_deref()).await?;
            Ok(formatter.format_fields(&fields))
        }
        Command::Definitions { include_inactive } => {
            let list = definitions.list_definitions(include_inactive).await?;
            Ok(formatter.format_definitions(&list))
        }
        Command::Catalog { entity_type } => {
            let behaviors = service.field_definitions(&entity_type).await?;
            Ok(formatter.format_behaviors(&behaviors))
        }
        Command::Create(args) => {
            let id = definitions.create(new_field(args)).await?;
            Ok(formatter.format_message("created field", Some(json!(id))))
        }
        Command::Attach {
            field_id,
            entity_type,
            required,
            hidden,
            order,
        } => {
            let options = AttachOptions {
                required,
                visible_by_default: Some(!hidden),
                display_order: order,
            };
            definitions.attach_to_entity(field_id, &entity_type, options).await?;
            Ok(formatter.format_message("attached field", Some(json!({ "field_id": field_id, "entity_type": entity_type }))))
        }
        Command::Patch {
            field_id,
            name,
            description,
            clear_description,
            data_type,
        } => {
            let mut patch = FieldPatch::new()
                .maybe("name", name)
                .maybe("data_type", data_type);
            patch = if clear_description {
                patch.clear("description")
            } else {
                patch.maybe("description", description)
            };
            definitions.patch_meta(field_id, patch).await?;
            Ok(formatter.format_message("patched field", Some(json!(field_id))))
        }
        Command::ChangeType { field_id, data_type } => {
            definitions.change_data_type(field_id, &data_type).await?;
            Ok(formatter.format_message("changed data type", Some(json!({ "field_id": field_id, "data_type": data_type }))))
        }
        Command::Deactivate { field_id, reason } => {
            definitions.deactivate(field_id, reason.as_deref()).await?;
            Ok(formatter.format_message("deactivated field", Some(json!(field_id))))
        }
        Command::Bootstrap { entity_type } => {
            let count = definitions.bootstrap(entity_type.as_deref()).await?;
            Ok(formatter.format_message("bootstrapped definitions", Some(json!(count))))
        }
        Command::ChoiceSets { include_inactive } => {
            let sets = definitions.list_choice_sets(include_inactive).await?;
            Ok(formatter.format_choice_sets(&sets))
        }
        Command::ApplyMigration => {
            let chain = MigrationChain::from_config(definitions.store().clone(), definitions.config());
            info!(script = %chain.script().display(), strategies = ?chain.strategy_names(), "applying migration");
            match chain.run().await {
                Ok(applied) => Ok(formatter.format_message("migration applied", Some(json!(applied)))),
                Err(failures) => {
                    let attempts: Vec<String> = failures.iter().map(ToString::to_string).collect();
                    Err(ExecuteError::Migration(attempts.join(" | ")))
                }
            }
        }
    }
}

fn new_field(args: CreateArgs) -> NewField {
    let mut field = NewField::new(args.name, args.code)
        .with_data_type(args.data_type)
        .with_entities(args.entities)
        .with_link_targets(args.link_targets);
    if let Some(choice_set) = args.choice_set {
        field = field.with_choice_set(choice_set);
    }
    field.description = args.description;
    field.required = args.required;
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{create_formatter, OutputFormat};
    use apexfield_core::store::fixture::install_schema_procedures;
    use apexfield_core::{CoreConfig, MemoryStore};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn service() -> FieldService {
        let store = MemoryStore::new();
        install_schema_procedures(&store);
        FieldService::new(Arc::new(store), CoreConfig::new())
    }

    fn create(name: &str, code: &str, entities: &[&str]) -> Command {
        Command::Create(CreateArgs {
            name: name.to_string(),
            code: code.to_string(),
            entities: entities.iter().map(|e| e.to_string()).collect(),
            data_type: "float".to_string(),
            description: None,
            required: false,
            choice_set: None,
            link_targets: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let service = service();
        let json = create_formatter(OutputFormat::Json);

        let out = execute(&service, create("Bid Days", "bid_days", &["task"]), &*json)
            .await
            .unwrap();
        let out: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(out["value"], 1);

        let out = execute(&service, Command::ListFields { entity_type: Some("task".into()) }, &*json)
            .await
            .unwrap();
        let fields: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(fields[0]["code"], "bid_days");
        assert_eq!(fields[0]["data_type"], "float");
    }

    #[tokio::test]
    async fn test_attach_and_deactivate() {
        let service = service();
        let table = create_formatter(OutputFormat::Table);
        execute(&service, create("Bid", "bid", &["task"]), &*table).await.unwrap();

        let attach = Command::Attach {
            field_id: 1,
            entity_type: "shot".into(),
            required: true,
            hidden: true,
            order: Some(5),
        };
        execute(&service, attach, &*table).await.unwrap();
        let shot = service.definitions().runtime_fields("shot").await.unwrap();
        assert!(shot[0].required);
        assert!(!shot[0].visible_by_default);
        assert_eq!(shot[0].display_order, 5);

        let deactivate = Command::Deactivate {
            field_id: 1,
            reason: Some("unused".into()),
        };
        execute(&service, deactivate, &*table).await.unwrap();
        assert!(service.definitions().runtime_fields("task").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_migration_reports_every_attempt() {
        let service = FieldService::new(
            Arc::new(MemoryStore::new()),
            CoreConfig::new()
                .with_migration_script("/nonexistent/fields-datatype-sync.sql")
                .with_credential_env(Vec::<String>::new()),
        );
        let table = create_formatter(OutputFormat::Table);
        let err = execute(&service, Command::ApplyMigration, &*table).await.unwrap_err();
        assert!(matches!(err, ExecuteError::Migration(_)));
        assert!(err.to_string().contains("read script"));
    }
}
