//! Externally exposed services: read/write/delete verbs, each run as one unit of work that
//! commits on success and rolls back on failure.

use super::base::{Service, ServiceEnv};
use super::context::SharedContext;
use super::transactional::TransactionalService;
use crate::error::ServiceError;
use crate::store::{Filter, Record};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Read,
    Write,
    Delete,
}

impl FromStr for Verb {
    type Err = ServiceError;

    /// HTTP method name, upper case: `GET`, `POST` or `DELETE`.
    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            "GET" => Ok(Verb::Read),
            "POST" => Ok(Verb::Write),
            "DELETE" => Ok(Verb::Delete),
            other => Err(ServiceError::UnrecognizedVerb(other.to_string())),
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Verb::Read => "GET",
            Verb::Write => "POST",
            Verb::Delete => "DELETE",
        })
    }
}

/// Request data handed to an extension point.
#[derive(Clone, Debug, Default)]
pub struct VerbOptions {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

impl VerbOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Top-level fields of an object body; empty for any other body.
    pub fn body_record(&self) -> Record {
        match &self.body {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Record::new(),
        }
    }
}

/// Business actions of an external service, one per verb. Unimplemented verbs fail with
/// `NotImplemented`. Data access goes through `svc`, which carries the transaction.
#[async_trait]
pub trait ServiceActions: Send + Sync {
    async fn do_read(&self, _svc: &ExternalService, _opts: VerbOptions) -> Result<Value, ServiceError> {
        Err(ServiceError::NotImplemented("do_read"))
    }

    async fn do_write(&self, _svc: &ExternalService, _opts: VerbOptions) -> Result<Value, ServiceError> {
        Err(ServiceError::NotImplemented("do_write"))
    }

    async fn do_delete(&self, _svc: &ExternalService, _opts: VerbOptions) -> Result<Value, ServiceError> {
        Err(ServiceError::NotImplemented("do_delete"))
    }
}

pub struct ExternalService {
    name: String,
    inner: TransactionalService,
    actions: Arc<dyn ServiceActions>,
}

impl ExternalService {
    pub fn new(
        name: impl Into<String>,
        env: ServiceEnv,
        context: Option<SharedContext>,
        actions: Arc<dyn ServiceActions>,
    ) -> Self {
        ExternalService {
            name: name.into(),
            inner: TransactionalService::new(env, context),
            actions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transactional(&self) -> &TransactionalService {
        &self.inner
    }

    /// Run the extension point for `verb` in the current transaction without ending it.
    /// Used by callers that enlisted this service in their own context.
    pub async fn call(&self, verb: Verb, opts: VerbOptions) -> Result<Value, ServiceError> {
        match verb {
            Verb::Read => self.actions.do_read(self, opts).await,
            Verb::Write => self.actions.do_write(self, opts).await,
            Verb::Delete => self.actions.do_delete(self, opts).await,
        }
    }

    /// Run `method` as one unit of work: open (or join) the transaction, dispatch, then commit
    /// on success or roll back on failure. An unknown method fails before the transaction is
    /// touched.
    pub async fn execute_verb(&self, method: &str, opts: VerbOptions) -> Result<Value, ServiceError> {
        let verb: Verb = method.parse()?;
        let tx_id = self.inner.transaction().await?.id();
        tracing::debug!(service = %self.name, %verb, tx = %tx_id, "executing verb");

        match self.call(verb, opts).await {
            Ok(result) => {
                self.inner.commit().await.map_err(|e| {
                    tracing::error!(service = %self.name, %verb, tx = %tx_id, error = %e, "commit failed");
                    ServiceError::CommitFailed(e.to_string())
                })?;
                Ok(result)
            }
            Err(err) => {
                if let Err(rb) = self.inner.rollback().await {
                    tracing::warn!(service = %self.name, %verb, tx = %tx_id, error = %rb, "rollback failed");
                }
                tracing::debug!(service = %self.name, %verb, tx = %tx_id, error = %err, "verb failed");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Service for ExternalService {
    fn context(&self) -> &SharedContext {
        self.inner.context()
    }

    fn env(&self) -> &ServiceEnv {
        self.inner.env()
    }

    async fn model_instance(&self, entity: &str, id: Option<&Value>) -> Result<Option<Value>, ServiceError> {
        self.inner.model_instance(entity, id).await
    }

    async fn record_set(&self, entity: &str, filter: &Filter) -> Result<Vec<Value>, ServiceError> {
        self.inner.record_set(entity, filter).await
    }

    async fn create_model_instance(&self, entity: &str, data: &Record) -> Result<Value, ServiceError> {
        self.inner.create_model_instance(entity, data).await
    }

    async fn save_model_instance(&self, entity: &str, data: &Record) -> Result<Option<Value>, ServiceError> {
        self.inner.save_model_instance(entity, data).await
    }

    async fn destroy_model_instance(&self, entity: &str, id: &Value) -> Result<Option<Value>, ServiceError> {
        self.inner.destroy_model_instance(entity, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceRegistry;
    use crate::store::{DataStore, MemoryStore};
    use crate::test_support::{memory_store, widget_registry, ScratchThenFail, WidgetActions};
    use serde_json::json;

    fn env(store: &MemoryStore) -> ServiceEnv {
        ServiceEnv::new(Arc::new(store.clone()), widget_registry())
    }

    fn widget_service(store: &MemoryStore) -> ExternalService {
        ExternalService::new("WidgetService", env(store), None, Arc::new(WidgetActions))
    }

    #[test]
    fn parses_http_methods() {
        assert_eq!("GET".parse::<Verb>().unwrap(), Verb::Read);
        assert_eq!("POST".parse::<Verb>().unwrap(), Verb::Write);
        assert_eq!("DELETE".parse::<Verb>().unwrap(), Verb::Delete);
        assert!(matches!("PUT".parse::<Verb>(), Err(ServiceError::UnrecognizedVerb(m)) if m == "PUT"));
        assert!("get".parse::<Verb>().is_err());
        assert_eq!(Verb::Delete.to_string(), "DELETE");
    }

    #[tokio::test]
    async fn success_commits_once() {
        let store = memory_store();
        let svc = widget_service(&store);
        let out = svc
            .execute_verb("POST", VerbOptions::new().body(json!({"name": "x"})))
            .await
            .unwrap();
        assert_eq!(out["name"], json!("x"));
        assert_eq!(out["id"], json!(1));
        assert_eq!(store.stats().begun(), 1);
        assert_eq!(store.stats().committed(), 1);
        assert_eq!(store.stats().rolled_back(), 0);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_by_id("widget", &json!(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failure_rolls_back_once_and_keeps_the_message() {
        let store = memory_store();
        let svc = ExternalService::new("Scratch", env(&store), None, Arc::new(ScratchThenFail));
        let err = svc.execute_verb("GET", VerbOptions::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "missing");
        assert_eq!(store.stats().committed(), 0);
        assert_eq!(store.stats().rolled_back(), 1);
        assert!(store.is_empty("widget"));
    }

    #[tokio::test]
    async fn unknown_method_touches_no_transaction() {
        let store = memory_store();
        let svc = widget_service(&store);
        let err = svc.execute_verb("PATCH", VerbOptions::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnrecognizedVerb(_)));
        assert_eq!(store.stats().begun(), 0);
        assert_eq!(store.stats().committed(), 0);
        assert_eq!(store.stats().rolled_back(), 0);
    }

    #[tokio::test]
    async fn unimplemented_verb_rolls_back() {
        struct ReadOnly;
        impl ServiceActions for ReadOnly {}

        let store = memory_store();
        let svc = ExternalService::new("ReadOnly", env(&store), None, Arc::new(ReadOnly));
        let err = svc.execute_verb("DELETE", VerbOptions::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotImplemented("do_delete")));
        assert_eq!(store.stats().rolled_back(), 1);
    }

    #[tokio::test]
    async fn rollback_failure_keeps_the_action_error() {
        let store = memory_store();
        store.fail_next_rollback();
        let svc = ExternalService::new("Scratch", env(&store), None, Arc::new(ScratchThenFail));
        let err = svc.execute_verb("GET", VerbOptions::new()).await.unwrap_err();
        assert!(matches!(&err, ServiceError::Action(m) if m == "missing"));
        assert_eq!(store.stats().committed(), 0);
        assert_eq!(store.stats().rolled_back(), 0);
        assert!(store.is_empty("widget"));

        let tx = svc.context().transaction().unwrap();
        assert!(!tx.is_open().await);
    }

    #[tokio::test]
    async fn commit_failure_is_reported() {
        let store = memory_store();
        store.fail_next_commit();
        let svc = widget_service(&store);
        let err = svc
            .execute_verb("POST", VerbOptions::new().body(json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CommitFailed(_)));
        assert!(store.is_empty("widget"));
    }

    #[tokio::test]
    async fn nested_call_joins_the_caller_transaction() {
        let store = memory_store();
        let outer = widget_service(&store);
        let nested = outer
            .service("WidgetService", Some(outer.context().clone()))
            .unwrap();
        let created = nested
            .call(Verb::Write, VerbOptions::new().body(json!({"name": "inner"})))
            .await
            .unwrap();

        let id = created["id"].to_string();
        let read = outer
            .execute_verb("GET", VerbOptions::new().param("id", id))
            .await
            .unwrap();
        assert_eq!(read["name"], json!("inner"));
        assert_eq!(store.stats().begun(), 1);
        assert_eq!(store.stats().committed(), 1);
        assert_eq!(store.len("widget"), 1);
    }

    #[tokio::test]
    async fn nested_service_without_context_runs_separately() {
        let store = memory_store();
        let mut registry = ServiceRegistry::new();
        registry.register_default::<WidgetActions>("WidgetService", true);
        let env = ServiceEnv::new(Arc::new(store.clone()), Arc::new(registry));
        let outer = ExternalService::new("Scratch", env, None, Arc::new(ScratchThenFail));
        let other = outer.service("WidgetService", None).unwrap();
        other
            .execute_verb("POST", VerbOptions::new().body(json!({"name": "kept"})))
            .await
            .unwrap();
        assert!(outer.execute_verb("GET", VerbOptions::new()).await.is_err());
        assert_eq!(store.len("widget"), 1);
        assert_eq!(store.stats().begun(), 2);
    }
}
