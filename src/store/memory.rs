//! In-process store. Each transaction works on a snapshot taken at begin and replays its
//! writes onto the shared tables at commit; a rollback just drops them.

use super::{DataStore, Filter, Record, StoreTransaction};
use crate::config::{PkType, ResolvedEntity, ResolvedModel};
use crate::error::StoreError;
use crate::sql::{DEFAULT_LIMIT, MAX_LIMIT};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PkKey {
    Int(i64),
    Text(String),
}

impl PkKey {
    fn from_value(v: &Value, pk_type: &PkType) -> Result<Self, StoreError> {
        match (pk_type, v) {
            (PkType::Int | PkType::BigInt, Value::Number(n)) => n
                .as_i64()
                .map(PkKey::Int)
                .ok_or_else(|| StoreError::InvalidRecord(format!("invalid id: {}", n))),
            (PkType::Int | PkType::BigInt, Value::String(s)) => s
                .parse()
                .map(PkKey::Int)
                .map_err(|_| StoreError::InvalidRecord(format!("invalid id: {}", s))),
            (_, Value::String(s)) => Ok(PkKey::Text(s.clone())),
            (_, Value::Number(n)) => Ok(PkKey::Text(n.to_string())),
            (_, other) => Err(StoreError::InvalidRecord(format!("invalid id: {}", other))),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            PkKey::Int(n) => Value::Number((*n).into()),
            PkKey::Text(s) => Value::String(s.clone()),
        }
    }
}

type Table = BTreeMap<PkKey, Value>;

enum Write {
    /// `created` puts must not find the key already committed.
    Put {
        entity: String,
        key: PkKey,
        row: Value,
        created: bool,
    },
    Remove { entity: String, key: PkKey },
}

/// Transaction counters, readable while transactions are in flight.
#[derive(Debug, Default)]
pub struct TxStats {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

impl TxStats {
    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Shared {
    tables: Mutex<HashMap<String, Table>>,
    sequences: Mutex<HashMap<String, i64>>,
    stats: TxStats,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
}

#[derive(Clone)]
pub struct MemoryStore {
    model: Arc<ResolvedModel>,
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new(model: Arc<ResolvedModel>) -> Self {
        MemoryStore {
            model,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn stats(&self) -> &TxStats {
        &self.shared.stats
    }

    /// Make the next commit fail after its writes are discarded.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next rollback report an error. Its writes are still discarded.
    pub fn fail_next_rollback(&self) {
        self.shared.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    /// Committed row count for `entity`.
    pub fn len(&self, entity: &str) -> usize {
        lock(&self.shared.tables).get(entity).map(Table::len).unwrap_or(0)
    }

    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn entity<'m>(model: &'m ResolvedModel, name: &str) -> Result<&'m ResolvedEntity, StoreError> {
    model
        .entity(name)
        .ok_or_else(|| StoreError::UnknownEntity(name.to_string()))
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let working = lock(&self.shared.tables).clone();
        self.shared.stats.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            model: self.model.clone(),
            shared: self.shared.clone(),
            working,
            writes: Vec::new(),
        }))
    }

    fn blank_record(&self, name: &str) -> Result<Value, StoreError> {
        Ok(entity(&self.model, name)?.blank_record())
    }
}

struct MemoryTransaction {
    model: Arc<ResolvedModel>,
    shared: Arc<Shared>,
    working: HashMap<String, Table>,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    fn table(&mut self, e: &ResolvedEntity) -> &mut Table {
        self.working.entry(e.name.clone()).or_default()
    }

    fn put(&mut self, e: &ResolvedEntity, key: PkKey, row: Value, created: bool) {
        self.table(e).insert(key.clone(), row.clone());
        self.writes.push(Write::Put {
            entity: e.name.clone(),
            key,
            row,
            created,
        });
    }

    /// Next generated key not already present in this transaction's view of the table.
    fn next_key(&mut self, e: &ResolvedEntity) -> Result<PkKey, StoreError> {
        loop {
            let key = match e.pk_type {
                PkType::Int | PkType::BigInt => {
                    let mut seqs = lock(&self.shared.sequences);
                    let next = seqs.entry(e.name.clone()).or_insert(0);
                    *next += 1;
                    PkKey::Int(*next)
                }
                PkType::Uuid => PkKey::Text(uuid::Uuid::new_v4().to_string()),
                PkType::Text => {
                    return Err(StoreError::InvalidRecord(format!("'{}' is required", e.pk())))
                }
            };
            if !self.table(e).contains_key(&key) {
                return Ok(key);
            }
        }
    }

    /// Keep the sequence ahead of explicitly inserted integer keys.
    fn advance_sequence(&self, e: &ResolvedEntity, key: &PkKey) {
        if let PkKey::Int(n) = key {
            let mut seqs = lock(&self.shared.sequences);
            let current = seqs.entry(e.name.clone()).or_insert(0);
            *current = (*current).max(*n);
        }
    }
}

fn duplicate(e: &ResolvedEntity, key: &PkKey) -> StoreError {
    StoreError::InvalidRecord(format!("duplicate key {} = {}", e.pk(), key.to_value()))
}

fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

/// Literal column defaults for the columns `data` leaves out.
fn apply_defaults(e: &ResolvedEntity, row: &mut Value, data: &Record) {
    if let Value::Object(map) = row {
        for c in &e.columns {
            if let (Some(d), false) = (&c.default, data.contains_key(&c.name)) {
                map.insert(c.name.clone(), d.clone());
            }
        }
    }
}

/// Copy known, non-key columns from `data` into `row`.
fn merge_columns(e: &ResolvedEntity, row: &mut Value, data: &Record) {
    if let Value::Object(map) = row {
        for c in &e.columns {
            if c.pk_type.is_some() {
                continue;
            }
            if let Some(v) = data.get(&c.name) {
                map.insert(c.name.clone(), v.clone());
            }
        }
    }
}

fn check_not_null(e: &ResolvedEntity, row: &Value) -> Result<(), StoreError> {
    for c in e.columns.iter().filter(|c| !c.nullable && !c.has_default && c.pk_type.is_none()) {
        if row.get(&c.name).map_or(true, Value::is_null) {
            return Err(StoreError::InvalidRecord(format!("{} cannot be null", c.name)));
        }
    }
    Ok(())
}

fn matches(row: &Value, conditions: &[(String, Value)], e: &ResolvedEntity) -> bool {
    conditions
        .iter()
        .filter(|(col, _)| e.column(col).is_some())
        .all(|(col, want)| row.get(col).unwrap_or(&Value::Null) == want)
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_by_id(&mut self, name: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let model = self.model.clone();
        let e = entity(&model, name)?;
        let key = PkKey::from_value(id, &e.pk_type)?;
        tracing::debug!(entity = %name, id = %id, "find_by_id (memory)");
        Ok(self.working.get(&e.name).and_then(|t| t.get(&key)).cloned())
    }

    async fn find_all(&mut self, name: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let model = self.model.clone();
        let e = entity(&model, name)?;
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
        let offset = filter.offset.unwrap_or(0) as usize;
        tracing::debug!(entity = %name, filter = ?filter, "find_all (memory)");
        Ok(self
            .working
            .get(&e.name)
            .map(|t| {
                t.values()
                    .filter(|row| matches(row, &filter.conditions, e))
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&mut self, name: &str, data: &Record) -> Result<Value, StoreError> {
        let model = self.model.clone();
        let e = entity(&model, name)?;
        let key = match data.get(e.pk()).filter(|v| !v.is_null()) {
            Some(v) => {
                let key = PkKey::from_value(v, &e.pk_type)?;
                if self.table(e).contains_key(&key) {
                    return Err(duplicate(e, &key));
                }
                self.advance_sequence(e, &key);
                key
            }
            None => self.next_key(e)?,
        };
        let mut row = e.blank_record();
        apply_defaults(e, &mut row, data);
        merge_columns(e, &mut row, data);
        if let Value::Object(map) = &mut row {
            map.insert(e.pk().to_string(), key.to_value());
            if e.timestamps {
                map.insert("created_at".into(), now());
                map.insert("updated_at".into(), now());
            }
        }
        check_not_null(e, &row)?;
        tracing::debug!(entity = %name, id = %key.to_value(), "create (memory)");
        self.put(e, key, row.clone(), true);
        Ok(row)
    }

    async fn update(&mut self, name: &str, data: &Record) -> Result<Option<Value>, StoreError> {
        let model = self.model.clone();
        let e = entity(&model, name)?;
        let id = data
            .get(e.pk())
            .ok_or_else(|| StoreError::InvalidRecord(format!("'{}' is required for update", e.pk())))?;
        let key = PkKey::from_value(id, &e.pk_type)?;
        let Some(mut row) = self.table(e).get(&key).cloned() else {
            return Ok(None);
        };
        merge_columns(e, &mut row, data);
        if e.timestamps {
            if let Value::Object(map) = &mut row {
                map.insert("updated_at".into(), now());
            }
        }
        check_not_null(e, &row)?;
        tracing::debug!(entity = %name, id = %id, "update (memory)");
        self.put(e, key, row.clone(), false);
        Ok(Some(row))
    }

    async fn destroy(&mut self, name: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let model = self.model.clone();
        let e = entity(&model, name)?;
        let key = PkKey::from_value(id, &e.pk_type)?;
        let removed = self.table(e).remove(&key);
        if removed.is_some() {
            tracing::debug!(entity = %name, id = %id, "destroy (memory)");
            self.writes.push(Write::Remove {
                entity: e.name.clone(),
                key,
            });
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Db(sqlx::Error::Protocol("commit rejected".into())));
        }
        let MemoryTransaction {
            model, shared, writes, ..
        } = *self;
        {
            let mut tables = lock(&shared.tables);
            // Replay onto a copy so a conflict leaves the committed tables untouched.
            let mut next = tables.clone();
            for w in writes {
                match w {
                    Write::Put {
                        entity: name,
                        key,
                        row,
                        created,
                    } => {
                        if created && next.get(&name).is_some_and(|t| t.contains_key(&key)) {
                            tracing::debug!(entity = %name, id = %key.to_value(), "commit conflict (memory)");
                            return Err(duplicate(entity(&model, &name)?, &key));
                        }
                        next.entry(name).or_default().insert(key, row);
                    }
                    Write::Remove { entity: name, key } => {
                        if let Some(t) = next.get_mut(&name) {
                            t.remove(&key);
                        }
                    }
                }
            }
            *tables = next;
        }
        shared.stats.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        if self.shared.fail_next_rollback.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Db(sqlx::Error::Protocol("rollback rejected".into())));
        }
        self.shared.stats.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
