//! Model definition files as deserialized from JSON. Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Postgres enum type, created during schema sync.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumConfig {
    pub id: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableCheck {
    pub name: String,
    pub expression: String,
}

/// `"id"` or `["tenant_id", "id"]`. Entity routes address rows by the first column.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKeyConfig {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKeyConfig::Single(s) => vec![s.as_str()],
            PrimaryKeyConfig::Composite(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub id: String,
    /// Falls back to the first schema.
    #[serde(default)]
    pub schema_id: Option<String>,
    pub name: String,
    pub primary_key: PrimaryKeyConfig,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    #[serde(default)]
    pub check: Vec<TableCheck>,
    /// Adds managed `created_at` / `updated_at` columns.
    #[serde(default)]
    pub timestamps: bool,
}

/// `"text"` or `{"name": "numeric", "params": [10, 2]}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }

    /// Full SQL type, including parameters (e.g. `numeric(10, 2)`).
    pub fn sql(&self) -> String {
        match self {
            ColumnTypeConfig::Simple(s) => s.clone(),
            ColumnTypeConfig::Parameterized { name, params } => match params.as_deref() {
                Some(p) if !p.is_empty() => {
                    let p: Vec<String> = p.iter().map(u32::to_string).collect();
                    format!("{}({})", name, p.join(", "))
                }
                _ => name.clone(),
            },
        }
    }
}

/// Column default: a SQL literal written as-is (`"0"`, `"'draft'"`) or an expression
/// (`{"expression": "gen_random_uuid()"}`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnDefaultConfig {
    Literal(String),
    Expression { expression: String },
}

impl ColumnDefaultConfig {
    pub fn sql(&self) -> &str {
        match self {
            ColumnDefaultConfig::Literal(s) => s,
            ColumnDefaultConfig::Expression { expression } => expression,
        }
    }

    /// JSON value of a plain literal: numbers, booleans and quoted strings. Expressions and
    /// anything needing evaluation give `None`.
    pub fn literal_value(&self) -> Option<serde_json::Value> {
        let ColumnDefaultConfig::Literal(raw) = self else {
            return None;
        };
        let raw = raw.trim();
        if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            return Some(serde_json::Value::String(inner.replace("''", "'")));
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" => return Some(serde_json::Value::Bool(true)),
            "false" => return Some(serde_json::Value::Bool(false)),
            _ => {}
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(n @ serde_json::Value::Number(_)) => Some(n),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// Globally unique, conventionally `<table_id>.<name>`.
    pub id: String,
    pub table_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ColumnDefaultConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexColumnEntry {
    Name(String),
    Spec {
        name: String,
        direction: Option<String>,
        nulls: Option<String>,
    },
    Expression { expression: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    pub id: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    pub table_id: String,
    pub name: String,
    /// btree when unset.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<IndexColumnEntry>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default, rename = "where")]
    pub where_: Option<String>,
}

/// Foreign key from one column to another.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub id: String,
    pub from_schema_id: String,
    pub from_table_id: String,
    pub from_column_id: String,
    pub to_schema_id: String,
    pub to_table_id: String,
    pub to_column_id: String,
    #[serde(default)]
    pub on_update: Option<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
    /// Constraint name; the relationship id when unset.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    /// `email` or `uuid`.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Exposes a table through the generated CRUD routes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEntityConfig {
    /// Table id.
    pub entity_id: String,
    pub path_segment: String,
    /// Any of `create`, `read`, `update`, `delete`; all four when unset.
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    /// Columns never returned by the entity routes.
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

fn default_operations() -> Vec<String> {
    ["create", "read", "update", "delete"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// All model definition files in one struct.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub schemas: Vec<SchemaConfig>,
    #[serde(default)]
    pub enums: Vec<EnumConfig>,
    pub tables: Vec<TableConfig>,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    #[serde(default)]
    pub api_entities: Vec<ApiEntityConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_shapes() {
        let c: ColumnConfig = serde_json::from_value(json!({
            "id": "t.price", "table_id": "t", "name": "price",
            "type": {"name": "numeric", "params": [10, 2]}, "default": "0", "comment": "ignored"
        }))
        .unwrap();
        assert_eq!(c.type_.sql(), "numeric(10, 2)");
        assert_eq!(c.type_.name(), "numeric");
        assert!(c.nullable);
        assert_eq!(c.default.as_ref().map(ColumnDefaultConfig::sql), Some("0"));

        let d: ColumnDefaultConfig = serde_json::from_value(json!({"expression": "now()"})).unwrap();
        assert_eq!(d.sql(), "now()");
        assert!(serde_json::from_value::<ColumnDefaultConfig>(json!(5)).is_err());
    }

    #[test]
    fn literal_defaults_as_json() {
        let lit = |s: &str| ColumnDefaultConfig::Literal(s.into()).literal_value();
        assert_eq!(lit("0"), Some(json!(0)));
        assert_eq!(lit(" 2.5 "), Some(json!(2.5)));
        assert_eq!(lit("TRUE"), Some(json!(true)));
        assert_eq!(lit("'it''s'"), Some(json!("it's")));
        assert_eq!(lit("now()"), None);
        assert_eq!(lit("null"), None);
        let expr = ColumnDefaultConfig::Expression {
            expression: "1".into(),
        };
        assert_eq!(expr.literal_value(), None);
    }

    #[test]
    fn index_column_entries() {
        let cols: Vec<IndexColumnEntry> = serde_json::from_value(json!([
            "a",
            {"name": "b", "direction": "desc"},
            {"expression": "lower(c)"}
        ]))
        .unwrap();
        assert!(matches!(&cols[0], IndexColumnEntry::Name(n) if n == "a"));
        assert!(matches!(&cols[1], IndexColumnEntry::Spec { direction: Some(d), .. } if d == "desc"));
        assert!(matches!(&cols[2], IndexColumnEntry::Expression { .. }));
    }

    #[test]
    fn api_entity_defaults_to_all_operations() {
        let api: ApiEntityConfig =
            serde_json::from_value(json!({"entity_id": "t", "path_segment": "ts"})).unwrap();
        assert_eq!(api.operations, vec!["create", "read", "update", "delete"]);
        assert!(api.sensitive_columns.is_empty());
    }
}
