//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Primary key type for parsing path/body ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub pk_type: Option<PkType>,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. gen_random_uuid(), NOW()).
    pub has_default: bool,
    /// Literal default as JSON, applied by stores that do not evaluate SQL defaults.
    pub default: Option<Value>,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding string values.
    pub pg_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    /// Table id from config; the name services use to address the entity.
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    /// Set when the table is listed in api_entities.
    pub path_segment: Option<String>,
    pub pk_columns: Vec<String>,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    /// Column names to strip from all API responses (sensitive data).
    pub sensitive_columns: HashSet<String>,
    pub validation: HashMap<String, ValidationRule>,
    pub timestamps: bool,
}

impl ResolvedEntity {
    pub fn pk(&self) -> &str {
        &self.pk_columns[0]
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }

    /// Record with every column set to null.
    pub fn blank_record(&self) -> Value {
        let map: Map<String, Value> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::Null))
            .collect();
        Value::Object(map)
    }

    pub fn strip_sensitive(&self, row: &mut Value) {
        if self.sensitive_columns.is_empty() {
            return;
        }
        if let Value::Object(map) = row {
            map.retain(|k, _| !self.sensitive_columns.contains(k));
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    by_name: HashMap<String, usize>,
    by_path: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn new(entities: Vec<ResolvedEntity>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_path = HashMap::new();
        for (i, e) in entities.iter().enumerate() {
            by_name.insert(e.name.clone(), i);
            by_name.entry(e.table_name.clone()).or_insert(i);
            if let Some(path) = &e.path_segment {
                by_path.insert(path.clone(), i);
            }
        }
        ResolvedModel {
            entities,
            by_name,
            by_path,
        }
    }

    /// Look up by table id, then table name, then path segment.
    pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
        self.by_name
            .get(name)
            .or_else(|| self.by_path.get(name))
            .map(|&i| &self.entities[i])
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.by_path.get(path).map(|&i| &self.entities[i])
    }

    pub fn exposed(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities.iter().filter(|e| e.path_segment.is_some())
    }
}
