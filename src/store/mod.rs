//! Data-access interface: a store opens transactions, and every data call runs inside one.

mod memory;
mod postgres;

pub use memory::{MemoryStore, TxStats};
pub use postgres::PgStore;

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Column name to value, as accepted by create/update.
pub type Record = HashMap<String, Value>;

/// Exact-match filter with paging, as used by `find_all`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<(String, Value)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Parse `{"where": {column: value, ..}, "limit": n, "offset": n}`. A bare object without
    /// any of those keys is taken as the `where` map itself.
    pub fn from_json(value: &Value) -> Result<Self, StoreError> {
        let obj = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(obj) => obj,
            _ => return Err(StoreError::InvalidRecord("filter must be a JSON object".into())),
        };
        let structured = ["where", "limit", "offset"].iter().any(|k| obj.contains_key(*k));
        let conditions = match (structured, obj.get("where")) {
            (false, _) => Some(obj),
            (true, Some(Value::Object(w))) => Some(w),
            (true, None | Some(Value::Null)) => None,
            (true, Some(_)) => {
                return Err(StoreError::InvalidRecord("'where' must be a JSON object".into()))
            }
        };
        let paging = |key: &str| -> Result<Option<u32>, StoreError> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(Some)
                    .ok_or_else(|| StoreError::InvalidRecord(format!("'{}' must be a non-negative integer", key))),
            }
        };
        let (limit, offset) = if structured {
            (paging("limit")?, paging("offset")?)
        } else {
            (None, None)
        };
        Ok(Filter {
            conditions: conditions
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            limit,
            offset,
        })
    }
}

/// Entry point to a transactional data store.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Unsaved record for `entity` with every column unset.
    fn blank_record(&self, entity: &str) -> Result<Value, StoreError>;

    /// Liveness check used by the readiness route.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// One open unit of work. Ends with exactly one of `commit` or `rollback`.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_by_id(&mut self, entity: &str, id: &Value) -> Result<Option<Value>, StoreError>;

    async fn find_all(&mut self, entity: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    async fn create(&mut self, entity: &str, data: &Record) -> Result<Value, StoreError>;

    /// Update the record whose primary key is in `data`. `None` when no such record exists.
    async fn update(&mut self, entity: &str, data: &Record) -> Result<Option<Value>, StoreError>;

    /// Delete by primary key, returning the deleted record.
    async fn destroy(&mut self, entity: &str, id: &Value) -> Result<Option<Value>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
