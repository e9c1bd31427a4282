//! Load model definitions from a directory of JSON files and resolve them for runtime use.

use crate::config::resolved::{ColumnInfo, PkType, ResolvedEntity, ResolvedModel};
use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Build resolved model from full config. Validates first.
///
/// Every table becomes an entity; tables listed in api_entities additionally get a path segment,
/// operations, validation rules and sensitive columns.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;

    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();
    let columns_by_table: HashMap<_, Vec<&ColumnConfig>> =
        config.columns.iter().fold(HashMap::new(), |mut m, c| {
            m.entry(c.table_id.as_str()).or_default().push(c);
            m
        });
    let api_by_table: HashMap<&str, &ApiEntityConfig> = config
        .api_entities
        .iter()
        .map(|api| (api.entity_id.as_str(), api))
        .collect();

    let mut entities = Vec::with_capacity(config.tables.len());
    for table in &config.tables {
        let table_sid = table.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id
            .get(table_sid)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: table_sid.to_string(),
            })?;
        let table_columns = columns_by_table
            .get(table.id.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        let pk_names: Vec<String> = table.primary_key.columns().into_iter().map(String::from).collect();
        let pk_col = table_columns
            .iter()
            .find(|c| c.name == pk_names[0])
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                table_id: table.id.clone(),
                column: pk_names[0].clone(),
            })?;
        let pk_type = infer_pk_type(pk_col);

        let mut columns: Vec<ColumnInfo> = table_columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                pk_type: pk_names.contains(&c.name).then(|| pk_type.clone()),
                nullable: c.nullable,
                has_default: c.default.is_some() || is_serial(&c.type_),
                default: c.default.as_ref().and_then(ColumnDefaultConfig::literal_value),
                pg_type: column_pg_type_name(&c.type_),
            })
            .collect();

        if table.timestamps {
            let config_col_names: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
            for name in ["created_at", "updated_at"] {
                if !config_col_names.contains(name) {
                    columns.push(ColumnInfo {
                        name: name.to_string(),
                        pk_type: None,
                        nullable: false,
                        has_default: true,
                        default: None,
                        pg_type: Some("timestamptz".into()),
                    });
                }
            }
        }

        let api = api_by_table.get(table.id.as_str());
        entities.push(ResolvedEntity {
            name: table.id.clone(),
            schema_name: schema.name.clone(),
            table_name: table.name.clone(),
            path_segment: api.map(|a| a.path_segment.clone()),
            pk_columns: pk_names,
            pk_type,
            columns,
            operations: api.map(|a| a.operations.clone()).unwrap_or_default(),
            sensitive_columns: api
                .map(|a| a.sensitive_columns.iter().cloned().collect())
                .unwrap_or_default(),
            validation: api.map(|a| a.validation.clone()).unwrap_or_default(),
            timestamps: table.timestamps,
        });
    }

    Ok(ResolvedModel::new(entities))
}

/// Type name used for placeholder casts. Serial pseudo-types map to their storage type.
fn column_pg_type_name(ty: &ColumnTypeConfig) -> Option<String> {
    let name = ty.name().trim();
    if name.is_empty() {
        return None;
    }
    if name.contains('.') {
        // Schema-qualified custom type (e.g. sample.order_status); cast so text binds correctly
        return Some(name.to_string());
    }
    let lower = name.to_lowercase();
    let normalized = match lower.as_str() {
        "timestamp with time zone" => "timestamptz",
        "timestamp without time zone" => "timestamp",
        "smallserial" | "serial2" => "smallint",
        "serial" | "serial4" => "integer",
        "bigserial" | "serial8" => "bigint",
        "decimal" => "numeric",
        other => other,
    };
    Some(normalized.to_string())
}

fn is_serial(ty: &ColumnTypeConfig) -> bool {
    ty.name().to_lowercase().contains("serial")
}

fn infer_pk_type(col: &ColumnConfig) -> PkType {
    let type_lower = col.type_.name().to_lowercase();
    if type_lower.contains("uuid") {
        PkType::Uuid
    } else if type_lower.contains("bigserial") || type_lower.contains("bigint") {
        PkType::BigInt
    } else if type_lower.contains("serial") || type_lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}

/// Load model definitions from `dir`: schemas.json, tables.json and columns.json are required;
/// enums.json, indexes.json, relationships.json and api_entities.json default to empty.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    Ok(FullConfig {
        schemas: read_json(dir, "schemas.json", true).await?,
        enums: read_json(dir, "enums.json", false).await?,
        tables: read_json(dir, "tables.json", true).await?,
        columns: read_json(dir, "columns.json", true).await?,
        indexes: read_json(dir, "indexes.json", false).await?,
        relationships: read_json(dir, "relationships.json", false).await?,
        api_entities: read_json(dir, "api_entities.json", false).await?,
    })
}

async fn read_json<T>(dir: &Path, file: &str, required: bool) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let path = dir.join(file);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    tracing::debug!(path = %path.display(), "loading model file");
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}
