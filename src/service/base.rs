//! Service base: the data operations every service exposes, and lookup of sibling services.

use super::context::{ExecutionContext, SharedContext};
use super::external::ExternalService;
use super::registry::ServiceRegistry;
use crate::error::ServiceError;
use crate::store::{DataStore, Filter, Record};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// What a service runs against: the data store and the registry of named services.
#[derive(Clone)]
pub struct ServiceEnv {
    pub store: Arc<dyn DataStore>,
    pub registry: Arc<ServiceRegistry>,
}

impl ServiceEnv {
    pub fn new(store: Arc<dyn DataStore>, registry: Arc<ServiceRegistry>) -> Self {
        ServiceEnv { store, registry }
    }
}

/// Data operations scoped to the service's context. Every operation fails with
/// `NotImplemented` unless the variant provides it.
#[async_trait]
pub trait Service: Send + Sync {
    fn context(&self) -> &SharedContext;

    fn env(&self) -> &ServiceEnv;

    /// Record by id, or a blank record of `entity` when `id` is `None`.
    async fn model_instance(&self, _entity: &str, _id: Option<&Value>) -> Result<Option<Value>, ServiceError> {
        Err(ServiceError::NotImplemented("model_instance"))
    }

    async fn record_set(&self, _entity: &str, _filter: &Filter) -> Result<Vec<Value>, ServiceError> {
        Err(ServiceError::NotImplemented("record_set"))
    }

    async fn create_model_instance(&self, _entity: &str, _data: &Record) -> Result<Value, ServiceError> {
        Err(ServiceError::NotImplemented("create_model_instance"))
    }

    /// Persist changes to the record whose primary key is in `data`.
    async fn save_model_instance(&self, _entity: &str, _data: &Record) -> Result<Option<Value>, ServiceError> {
        Err(ServiceError::NotImplemented("save_model_instance"))
    }

    async fn destroy_model_instance(&self, _entity: &str, _id: &Value) -> Result<Option<Value>, ServiceError> {
        Err(ServiceError::NotImplemented("destroy_model_instance"))
    }

    /// Construct the service registered as `name`. Pass `Some(self.context().clone())` to run it
    /// in this service's transaction; `None` gives it a fresh context.
    fn service(&self, name: &str, context: Option<SharedContext>) -> Result<ExternalService, ServiceError> {
        let env = self.env();
        env.registry.build(name, env.clone(), context)
    }
}

/// Plain service: owns a context and inherits every default.
pub struct BaseService {
    context: SharedContext,
    env: ServiceEnv,
}

impl BaseService {
    pub fn new(env: ServiceEnv, context: Option<SharedContext>) -> Self {
        BaseService {
            context: context.unwrap_or_else(ExecutionContext::new),
            env,
        }
    }
}

impl Service for BaseService {
    fn context(&self) -> &SharedContext {
        &self.context
    }

    fn env(&self) -> &ServiceEnv {
        &self.env
    }
}
