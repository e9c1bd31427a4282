//! Transactional service: every data operation runs inside the context's transaction, which is
//! opened on first use.

use super::base::{Service, ServiceEnv};
use super::context::{ExecutionContext, SharedContext, Transaction};
use crate::error::{ServiceError, StoreError};
use crate::store::{Filter, Record};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct TransactionalService {
    context: SharedContext,
    env: ServiceEnv,
}

impl TransactionalService {
    pub fn new(env: ServiceEnv, context: Option<SharedContext>) -> Self {
        TransactionalService {
            context: context.unwrap_or_else(ExecutionContext::new),
            env,
        }
    }

    /// The context's transaction, opened now if it is not open yet.
    pub async fn transaction(&self) -> Result<&Arc<Transaction>, StoreError> {
        self.context.ensure_transaction(self.env.store.as_ref()).await
    }

    /// Commit the context's transaction. No-op when nothing was opened.
    pub async fn commit(&self) -> Result<(), StoreError> {
        match self.context.transaction() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }

    /// Roll back the context's transaction. No-op when nothing was opened.
    pub async fn rollback(&self) -> Result<(), StoreError> {
        match self.context.transaction() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Service for TransactionalService {
    fn context(&self) -> &SharedContext {
        &self.context
    }

    fn env(&self) -> &ServiceEnv {
        &self.env
    }

    async fn model_instance(&self, entity: &str, id: Option<&Value>) -> Result<Option<Value>, ServiceError> {
        match id {
            None => Ok(Some(self.env.store.blank_record(entity)?)),
            Some(id) => Ok(self.transaction().await?.find_by_id(entity, id).await?),
        }
    }

    async fn record_set(&self, entity: &str, filter: &Filter) -> Result<Vec<Value>, ServiceError> {
        Ok(self.transaction().await?.find_all(entity, filter).await?)
    }

    async fn create_model_instance(&self, entity: &str, data: &Record) -> Result<Value, ServiceError> {
        Ok(self.transaction().await?.create(entity, data).await?)
    }

    async fn save_model_instance(&self, entity: &str, data: &Record) -> Result<Option<Value>, ServiceError> {
        Ok(self.transaction().await?.update(entity, data).await?)
    }

    async fn destroy_model_instance(&self, entity: &str, id: &Value) -> Result<Option<Value>, ServiceError> {
        Ok(self.transaction().await?.destroy(entity, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DataStore, MemoryStore};
    use crate::test_support::{empty_registry, memory_store};
    use serde_json::json;

    fn service(store: &MemoryStore, context: Option<SharedContext>) -> TransactionalService {
        TransactionalService::new(ServiceEnv::new(Arc::new(store.clone()), empty_registry()), context)
    }

    fn record(v: Value) -> Record {
        serde_json::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn blank_instance_does_not_open_a_transaction() {
        let store = memory_store();
        let svc = service(&store, None);
        let blank = svc.model_instance("widget", None).await.unwrap().unwrap();
        assert_eq!(blank, json!({"id": null, "name": null, "color": null, "secret": null}));
        assert_eq!(store.stats().begun(), 0);
    }

    #[tokio::test]
    async fn lookup_by_id_uses_the_transaction() {
        let store = memory_store();
        let svc = service(&store, None);
        let created = svc
            .create_model_instance("widget", &record(json!({"name": "a"})))
            .await
            .unwrap();
        let found = svc.model_instance("widget", Some(&created["id"])).await.unwrap();
        assert_eq!(found, Some(created));
        assert!(svc.model_instance("widget", Some(&json!(99))).await.unwrap().is_none());
        assert_eq!(store.stats().begun(), 1);
    }

    #[tokio::test]
    async fn concurrent_operations_share_one_transaction() {
        let store = memory_store();
        let svc = service(&store, None);
        let filter = Filter::new();
        let data = record(json!({"name": "a"}));
        let id = json!(1);
        let (a, b, c) = tokio::join!(
            svc.record_set("widget", &filter),
            svc.create_model_instance("widget", &data),
            svc.model_instance("widget", Some(&id)),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        assert_eq!(store.stats().begun(), 1);
    }

    #[tokio::test]
    async fn explicit_context_reuses_the_open_transaction() {
        let store = memory_store();
        let tx = Arc::new(Transaction::new(store.begin().await.unwrap()));
        let ctx = ExecutionContext::with_transaction(tx.clone());
        let svc = service(&store, Some(ctx.clone()));
        svc.create_model_instance("widget", &record(json!({"name": "a"})))
            .await
            .unwrap();
        let nested = service(&store, Some(ctx));
        let rows = nested.record_set("widget", &Filter::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.stats().begun(), 1);
        assert_eq!(svc.transaction().await.unwrap().id(), tx.id());
    }

    #[tokio::test]
    async fn save_and_destroy() {
        let store = memory_store();
        let svc = service(&store, None);
        svc.create_model_instance("widget", &record(json!({"id": 4, "name": "a"})))
            .await
            .unwrap();
        let saved = svc
            .save_model_instance("widget", &record(json!({"id": 4, "color": "red"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved["color"], json!("red"));
        let gone = svc.destroy_model_instance("widget", &json!(4)).await.unwrap();
        assert!(gone.is_some());
        svc.commit().await.unwrap();
        assert!(store.is_empty("widget"));
        assert_eq!(store.stats().committed(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_and_data_errors_propagate() {
        let store = memory_store();
        let svc = service(&store, None);
        svc.create_model_instance("widget", &record(json!({"name": "a"})))
            .await
            .unwrap();
        assert!(matches!(
            svc.record_set("nope", &Filter::new()).await,
            Err(ServiceError::Store(StoreError::UnknownEntity(_)))
        ));
        svc.rollback().await.unwrap();
        assert!(store.is_empty("widget"));
        assert!(matches!(
            svc.record_set("widget", &Filter::new()).await,
            Err(ServiceError::Store(StoreError::TransactionClosed))
        ));
    }
}
