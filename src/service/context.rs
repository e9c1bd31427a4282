//! Execution context and the transaction handle it carries.

use crate::error::StoreError;
use crate::store::{DataStore, Filter, Record, StoreTransaction};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

/// Context shared by reference between a service and the nested services it hands it to.
pub type SharedContext = Arc<ExecutionContext>;

/// Holds at most one transaction. Unopened until the first `ensure_transaction`; once set it
/// is never replaced.
#[derive(Default)]
pub struct ExecutionContext {
    transaction: OnceCell<Arc<Transaction>>,
}

impl ExecutionContext {
    pub fn new() -> SharedContext {
        Arc::new(Self::default())
    }

    /// Context enlisted in a transaction that is already open.
    pub fn with_transaction(tx: Arc<Transaction>) -> SharedContext {
        Arc::new(ExecutionContext {
            transaction: OnceCell::new_with(Some(tx)),
        })
    }

    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        self.transaction.get()
    }

    /// Open the transaction on first call. Concurrent callers wait on the same open and all
    /// receive the same handle; a failed open leaves the context unopened.
    pub async fn ensure_transaction(&self, store: &dyn DataStore) -> Result<&Arc<Transaction>, StoreError> {
        self.transaction
            .get_or_try_init(|| async { Transaction::begin(store).await.map(Arc::new) })
            .await
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("transaction", &self.transaction().map(|t| t.id()))
            .finish()
    }
}

enum TxState {
    Open(Box<dyn StoreTransaction>),
    Committed,
    RolledBack,
}

fn open(state: &mut TxState) -> Result<&mut Box<dyn StoreTransaction>, StoreError> {
    match state {
        TxState::Open(tx) => Ok(tx),
        TxState::Committed | TxState::RolledBack => Err(StoreError::TransactionClosed),
    }
}

/// A store transaction that reaches exactly one of committed or rolled back. Calls on the same
/// handle are serialized.
pub struct Transaction {
    id: Uuid,
    state: Mutex<TxState>,
}

impl Transaction {
    pub fn new(inner: Box<dyn StoreTransaction>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(tx = %id, "transaction opened");
        Transaction {
            id,
            state: Mutex::new(TxState::Open(inner)),
        }
    }

    pub async fn begin(store: &dyn DataStore) -> Result<Self, StoreError> {
        Ok(Self::new(store.begin().await?))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, TxState::Open(_))
    }

    pub async fn find_by_id(&self, entity: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let mut state = self.state.lock().await;
        open(&mut state)?.find_by_id(entity, id).await
    }

    pub async fn find_all(&self, entity: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let mut state = self.state.lock().await;
        open(&mut state)?.find_all(entity, filter).await
    }

    pub async fn create(&self, entity: &str, data: &Record) -> Result<Value, StoreError> {
        let mut state = self.state.lock().await;
        open(&mut state)?.create(entity, data).await
    }

    pub async fn update(&self, entity: &str, data: &Record) -> Result<Option<Value>, StoreError> {
        let mut state = self.state.lock().await;
        open(&mut state)?.update(entity, data).await
    }

    pub async fn destroy(&self, entity: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let mut state = self.state.lock().await;
        open(&mut state)?.destroy(entity, id).await
    }

    pub async fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let tx = match std::mem::replace(&mut *state, TxState::Committed) {
            TxState::Open(tx) => tx,
            finished => {
                *state = finished;
                return Err(StoreError::TransactionClosed);
            }
        };
        let result = tx.commit().await;
        match &result {
            Ok(()) => tracing::debug!(tx = %self.id, "transaction committed"),
            Err(e) => {
                // Nothing was applied, so the handle ends rolled back.
                *state = TxState::RolledBack;
                tracing::debug!(tx = %self.id, error = %e, "commit failed");
            }
        }
        result
    }

    pub async fn rollback(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, TxState::RolledBack) {
            TxState::Open(tx) => {
                tx.rollback().await?;
                tracing::debug!(tx = %self.id, "transaction rolled back");
                Ok(())
            }
            finished => {
                *state = finished;
                Err(StoreError::TransactionClosed)
            }
        }
    }
}
