//! PostgreSQL store: SQL generated from the resolved model, run inside a sqlx transaction.

use super::{DataStore, Filter, Record, StoreTransaction};
use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::StoreError;
use crate::sql::{delete, insert, select_by_id, select_list, update, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    model: Arc<ResolvedModel>,
}

impl PgStore {
    pub fn new(pool: PgPool, model: Arc<ResolvedModel>) -> Self {
        PgStore { pool, model }
    }
}

fn entity<'m>(model: &'m ResolvedModel, name: &str) -> Result<&'m ResolvedEntity, StoreError> {
    model
        .entity(name)
        .ok_or_else(|| StoreError::UnknownEntity(name.to_string()))
}

#[async_trait]
impl DataStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction {
            tx,
            model: self.model.clone(),
        }))
    }

    fn blank_record(&self, name: &str) -> Result<Value, StoreError> {
        Ok(entity(&self.model, name)?.blank_record())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    model: Arc<ResolvedModel>,
}

impl PgTransaction {
    async fn fetch_optional(&mut self, q: &QueryBuf) -> Result<Option<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let row = query.fetch_optional(&mut *self.tx).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn fetch_all(&mut self, q: &QueryBuf) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn find_by_id(&mut self, name: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let model = self.model.clone();
        let q = select_by_id(entity(&model, name)?, id);
        self.fetch_optional(&q).await
    }

    async fn find_all(&mut self, name: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let model = self.model.clone();
        let q = select_list(entity(&model, name)?, &filter.conditions, filter.limit, filter.offset);
        self.fetch_all(&q).await
    }

    async fn create(&mut self, name: &str, data: &Record) -> Result<Value, StoreError> {
        let model = self.model.clone();
        let q = insert(entity(&model, name)?, data);
        self.fetch_optional(&q)
            .await?
            .ok_or(StoreError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(&mut self, name: &str, data: &Record) -> Result<Option<Value>, StoreError> {
        let model = self.model.clone();
        let e = entity(&model, name)?;
        let id = data
            .get(e.pk())
            .ok_or_else(|| StoreError::InvalidRecord(format!("'{}' is required for update", e.pk())))?;
        let q = update(e, id, data);
        self.fetch_optional(&q).await
    }

    async fn destroy(&mut self, name: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let model = self.model.clone();
        let q = delete(entity(&model, name)?, id);
        self.fetch_optional(&q).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx, .. } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx, .. } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
