//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from resolved entity.

use crate::config::{ColumnInfo, ResolvedEntity};
use serde_json::Value;
use std::collections::HashMap;

/// Rows returned by list queries when no limit is given.
pub const DEFAULT_LIMIT: u32 = 100;
/// Upper bound for any list query.
pub const MAX_LIMIT: u32 = 1000;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder, cast to the column's type when it has one.
    fn placeholder(&mut self, column: Option<&ColumnInfo>, v: Value) -> String {
        let n = self.push_param(v);
        column
            .and_then(|c| c.pg_type.as_deref())
            .map(|t| format!("${}::{}", n, t))
            .unwrap_or_else(|| format!("${}", n))
    }
}

/// SELECT list: each column as-is, except custom enum (schema.typename) and numeric as col::text so sqlx returns String.
fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            let pg_type = c.pg_type.as_deref().unwrap_or("");
            if pg_type.contains('.') || pg_type == "numeric" {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// SELECT by primary key (single column PK only).
pub fn select_by_id(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = entity.pk();
    let ph = q.placeholder(entity.column(pk), id.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(entity),
        qualified_table(entity),
        quoted(pk),
        ph
    );
    q
}

/// SELECT list with optional filters (exact match per column), ORDER BY pk, LIMIT/OFFSET.
/// Filters on unknown columns are ignored; params bound in filter order.
pub fn select_list(
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    limit: Option<u32>,
    offset: Option<u32>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    for (col, val) in filters {
        let Some(c) = entity.column(col) else { continue };
        if val.is_null() {
            where_parts.push(format!("{} IS NULL", quoted(col)));
            continue;
        }
        let ph = q.placeholder(Some(c), val.clone());
        where_parts.push(format!("{} = {}", quoted(col), ph));
    }

    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset_clause = offset
        .filter(|n| *n > 0)
        .map(|n| format!(" OFFSET {}", n))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {}{}",
        select_column_list(entity),
        qualified_table(entity),
        where_clause,
        quoted(entity.pk()),
        limit,
        offset_clause
    );
    q
}

/// INSERT: columns and placeholders from entity; values from body.
/// Omits columns with DB default when body does not provide a value (so DB uses default).
pub fn insert(entity: &ResolvedEntity, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let val = body.get(&c.name).cloned();
        if val.is_none() && (c.has_default || c.pk_type.is_some()) {
            continue;
        }
        let ph = q.placeholder(Some(c), val.unwrap_or(Value::Null));
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    let table = qualified_table(entity);
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only columns present in body (and in entity columns).
/// With nothing to set (and no managed timestamps) this degrades to a SELECT by id.
pub fn update(entity: &ResolvedEntity, id: &Value, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = entity.pk();
    let mut sets = Vec::new();
    // Sorted so the generated SQL is stable for equal bodies.
    let mut keys: Vec<&String> = body.keys().collect();
    keys.sort();
    for k in keys {
        if k == pk || (entity.timestamps && (k == "created_at" || k == "updated_at")) {
            continue;
        }
        let Some(c) = entity.column(k) else { continue };
        let ph = q.placeholder(Some(c), body[k].clone());
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    if entity.timestamps {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    if sets.is_empty() {
        return select_by_id(entity, id);
    }
    let id_ph = q.placeholder(entity.column(pk), id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        quoted(pk),
        id_ph,
        select_column_list(entity)
    );
    q
}

/// DELETE by id.
pub fn delete(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = entity.pk();
    let ph = q.placeholder(entity.column(pk), id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        quoted(pk),
        ph,
        select_column_list(entity)
    );
    q
}
