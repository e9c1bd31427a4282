//! Schema sync: DDL for schemas, enums, tables, indexes and foreign keys, in dependency order.

use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig};
use crate::error::{AppError, ConfigError, StoreError};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// One DDL statement. Statements that Postgres cannot express idempotently (enum types,
/// constraints added after the fact) are `optional`: a failure there means the object
/// already exists and is skipped.
#[derive(Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub optional: bool,
}

impl Statement {
    fn required(sql: String) -> Self {
        Statement { sql, optional: false }
    }

    fn optional(sql: String) -> Self {
        Statement { sql, optional: true }
    }
}

fn missing(kind: &'static str, id: &str) -> ConfigError {
    ConfigError::MissingReference {
        kind,
        id: id.to_string(),
    }
}

/// DDL for `config`, validated first.
pub fn plan(config: &FullConfig) -> Result<Vec<Statement>, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;
    let schema_name = |sid: Option<&str>| -> Result<String, ConfigError> {
        let sid = sid.unwrap_or(default_sid);
        config
            .schemas
            .iter()
            .find(|s| s.id == sid)
            .map(|s| quote(&s.name))
            .ok_or_else(|| missing("schema", sid))
    };
    let tables_by_id: HashMap<&str, &TableConfig> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let table_name = |tid: &str| -> Result<String, ConfigError> {
        let t = tables_by_id.get(tid).ok_or_else(|| missing("table", tid))?;
        Ok(format!("{}.{}", schema_name(t.schema_id.as_deref())?, quote(&t.name)))
    };
    let column_name = |cid: &str| -> Result<String, ConfigError> {
        config
            .columns
            .iter()
            .find(|c| c.id == cid)
            .map(|c| quote(&c.name))
            .ok_or_else(|| missing("column", cid))
    };

    let mut out = Vec::new();

    for s in &config.schemas {
        let name = quote(&s.name);
        out.push(Statement::required(format!("CREATE SCHEMA IF NOT EXISTS {}", name)));
        if let Some(c) = &s.comment {
            out.push(Statement::optional(format!("COMMENT ON SCHEMA {} IS {}", name, literal(c))));
        }
    }

    for e in &config.enums {
        let values: Vec<String> = e.values.iter().map(|v| literal(v)).collect();
        out.push(Statement::optional(format!(
            "CREATE TYPE {}.{} AS ENUM ({})",
            schema_name(e.schema_id.as_deref())?,
            quote(&e.name),
            values.join(", ")
        )));
    }

    for t in &config.tables {
        let cols: Vec<&ColumnConfig> = config.columns.iter().filter(|c| c.table_id == t.id).collect();
        let mut defs: Vec<String> = Vec::new();
        for c in &cols {
            let mut def = format!("{} {}", quote(&c.name), c.type_.sql());
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(d) = &c.default {
                def.push_str(" DEFAULT ");
                def.push_str(d.sql());
            }
            defs.push(def);
        }
        if t.timestamps {
            let names: HashSet<&str> = cols.iter().map(|c| c.name.as_str()).collect();
            for name in ["created_at", "updated_at"] {
                if !names.contains(name) {
                    defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quote(name)));
                }
            }
        }
        let pk: Vec<String> = t.primary_key.columns().into_iter().map(quote).collect();
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        for u in &t.unique {
            let u: Vec<String> = u.iter().map(|s| quote(s)).collect();
            defs.push(format!("UNIQUE ({})", u.join(", ")));
        }
        for ch in &t.check {
            defs.push(format!("CONSTRAINT {} CHECK ({})", quote(&ch.name), ch.expression));
        }
        out.push(Statement::required(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            table_name(&t.id)?,
            defs.join(",\n  ")
        )));
    }

    for idx in &config.indexes {
        let parts: Vec<String> = idx
            .columns
            .iter()
            .map(|col| match col {
                IndexColumnEntry::Name(n) => quote(n),
                IndexColumnEntry::Spec { name, direction, nulls } => {
                    let mut part = quote(name);
                    if let Some(d) = direction {
                        part.push(' ');
                        part.push_str(&d.to_uppercase());
                    }
                    if let Some(n) = nulls {
                        part.push_str(" NULLS ");
                        part.push_str(&n.to_uppercase());
                    }
                    part
                }
                IndexColumnEntry::Expression { expression } => expression.clone(),
            })
            .collect();
        let include = if idx.include.is_empty() {
            String::new()
        } else {
            let inc: Vec<String> = idx.include.iter().map(|s| quote(s)).collect();
            format!(" INCLUDE ({})", inc.join(", "))
        };
        let where_clause = idx.where_.as_ref().map(|w| format!(" WHERE {}", w)).unwrap_or_default();
        out.push(Statement::required(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} USING {} ({}){}{}",
            if idx.unique { "UNIQUE " } else { "" },
            quote(&idx.name),
            table_name(&idx.table_id)?,
            idx.method.as_deref().unwrap_or("btree"),
            parts.join(", "),
            include,
            where_clause
        )));
    }

    for rel in &config.relationships {
        out.push(Statement::optional(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
            table_name(&rel.from_table_id)?,
            quote(rel.name.as_deref().unwrap_or(&rel.id)),
            column_name(&rel.from_column_id)?,
            table_name(&rel.to_table_id)?,
            column_name(&rel.to_column_id)?,
            rel.on_update.as_deref().unwrap_or("NO ACTION"),
            rel.on_delete.as_deref().unwrap_or("NO ACTION"),
        )));
    }

    Ok(out)
}

/// Run the DDL for `config` against `pool`. Safe to run on every start.
pub async fn apply_migrations(pool: &PgPool, config: &FullConfig) -> Result<(), AppError> {
    let statements = plan(config)?;
    tracing::info!(statements = statements.len(), "applying schema");
    for st in statements {
        tracing::debug!(sql = %st.sql, "ddl");
        match sqlx::query(&st.sql).execute(pool).await {
            Ok(_) => {}
            Err(e) if st.optional => tracing::debug!(error = %e, "skipped ddl"),
            Err(e) => return Err(StoreError::Db(e).into()),
        }
    }
    Ok(())
}
