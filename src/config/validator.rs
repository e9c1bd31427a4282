//! Cross-file consistency checks run before a model is resolved or synced.

use crate::config::{FullConfig, IndexColumnEntry};
use crate::error::ConfigError;
use std::collections::HashSet;

/// Path segment taken by the service routes under the entity prefix.
pub const SERVICES_SEGMENT: &str = "services";

/// Schema used by anything that leaves `schema_id` unset: the first one declared.
pub fn default_schema_id(config: &FullConfig) -> Result<&str, ConfigError> {
    match config.schemas.first() {
        Some(s) => Ok(&s.id),
        None => Err(ConfigError::Validation("at least one schema required".into())),
    }
}

struct Known<'a> {
    default_schema: &'a str,
    schemas: HashSet<&'a str>,
    tables: HashSet<&'a str>,
    columns: HashSet<&'a str>,
}

impl<'a> Known<'a> {
    fn new(config: &'a FullConfig) -> Result<Self, ConfigError> {
        Ok(Known {
            default_schema: default_schema_id(config)?,
            schemas: config.schemas.iter().map(|s| s.id.as_str()).collect(),
            tables: config.tables.iter().map(|t| t.id.as_str()).collect(),
            columns: config.columns.iter().map(|c| c.id.as_str()).collect(),
        })
    }

    fn schema(&self, id: Option<&'a str>) -> Result<(), ConfigError> {
        let id = id.unwrap_or(self.default_schema);
        require(self.schemas.contains(id), "schema", id)
    }

    fn table(&self, id: &str) -> Result<(), ConfigError> {
        require(self.tables.contains(id), "table", id)
    }
}

fn require(present: bool, kind: &'static str, id: &str) -> Result<(), ConfigError> {
    if present {
        Ok(())
    } else {
        Err(ConfigError::MissingReference {
            kind,
            id: id.to_string(),
        })
    }
}

fn column_names<'a>(config: &'a FullConfig, table_id: &str) -> HashSet<&'a str> {
    config
        .columns
        .iter()
        .filter(|c| c.table_id == table_id)
        .map(|c| c.name.as_str())
        .collect()
}

/// Reject configs whose ids do not line up: unknown schemas, tables or columns, primary
/// keys naming absent columns, duplicate table ids and duplicate API path segments.
pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let known = Known::new(config)?;

    for e in &config.enums {
        known.schema(e.schema_id.as_deref())?;
    }

    let mut seen = HashSet::new();
    for t in &config.tables {
        if !seen.insert(t.id.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate table id: {}", t.id)));
        }
        known.schema(t.schema_id.as_deref())?;
        let pk = t.primary_key.columns();
        if pk.is_empty() {
            return Err(ConfigError::Validation(format!("table {} has an empty primary key", t.id)));
        }
        let names = column_names(config, &t.id);
        if let Some(col) = pk.into_iter().find(|c| !names.contains(c)) {
            return Err(ConfigError::InvalidPrimaryKey {
                table_id: t.id.clone(),
                column: col.to_string(),
            });
        }
    }

    for c in &config.columns {
        known.table(&c.table_id)?;
    }

    for idx in &config.indexes {
        known.schema(idx.schema_id.as_deref())?;
        known.table(&idx.table_id)?;
        let names = column_names(config, &idx.table_id);
        for entry in &idx.columns {
            if let IndexColumnEntry::Name(n) | IndexColumnEntry::Spec { name: n, .. } = entry {
                require(names.contains(n.as_str()), "index column", n)?;
            }
        }
    }

    for r in &config.relationships {
        let ok = [&r.from_schema_id, &r.to_schema_id].iter().all(|s| known.schemas.contains(s.as_str()))
            && [&r.from_table_id, &r.to_table_id].iter().all(|t| known.tables.contains(t.as_str()))
            && [&r.from_column_id, &r.to_column_id].iter().all(|c| known.columns.contains(c.as_str()));
        require(ok, "relationship", &r.id)?;
    }

    let mut segments = HashSet::new();
    for api in &config.api_entities {
        known.table(&api.entity_id)?;
        if api.path_segment == SERVICES_SEGMENT {
            return Err(ConfigError::Validation(format!(
                "path segment '{}' is reserved for service routes",
                SERVICES_SEGMENT
            )));
        }
        if !segments.insert(api.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(api.path_segment.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::widget_config;
    use serde_json::json;

    #[test]
    fn fixture_is_valid() {
        let config = widget_config();
        validate(&config).unwrap();
        assert_eq!(default_schema_id(&config).unwrap(), "main");
    }

    #[test]
    fn primary_key_must_name_a_column() {
        let mut config = widget_config();
        config.tables[0].primary_key = crate::config::PrimaryKeyConfig::Single("nope".into());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPrimaryKey { column, .. }) if column == "nope"
        ));
    }

    #[test]
    fn duplicate_segments_are_rejected() {
        let mut config = widget_config();
        let again = config.api_entities[0].clone();
        config.api_entities.push(again);
        assert!(matches!(validate(&config), Err(ConfigError::DuplicatePathSegment(s)) if s == "widgets"));
    }

    #[test]
    fn services_segment_is_reserved() {
        let mut config = widget_config();
        config.api_entities[0].path_segment = "services".into();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(m)) if m.contains("reserved")));
    }

    #[test]
    fn dangling_references() {
        let mut config = widget_config();
        config.relationships[0].to_column_id = "widget.gone".into();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "relationship", .. })
        ));

        let mut config = widget_config();
        config.indexes.push(
            serde_json::from_value(json!({
                "id": "i", "table_id": "widget", "name": "i", "columns": ["colour"]
            }))
            .unwrap(),
        );
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "index column", id }) if id == "colour"
        ));

        let mut config = widget_config();
        config.tables[1].schema_id = Some("elsewhere".into());
        assert!(matches!(validate(&config), Err(ConfigError::MissingReference { kind: "schema", .. })));
    }
}
