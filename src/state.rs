//! Shared application state for all routes.

use crate::config::ResolvedModel;
use crate::error::ServiceError;
use crate::service::{segment_for, ExternalService, ServiceEnv, ServiceRegistry, TransactionalService};
use crate::store::DataStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub model: Arc<ResolvedModel>,
    pub registry: Arc<ServiceRegistry>,
}

impl AppState {
    pub fn new(store: Arc<dyn DataStore>, model: Arc<ResolvedModel>, registry: Arc<ServiceRegistry>) -> Self {
        AppState {
            store,
            model,
            registry,
        }
    }

    pub fn env(&self) -> ServiceEnv {
        ServiceEnv::new(self.store.clone(), self.registry.clone())
    }

    /// Fresh per-request service with its own context.
    pub fn transactional(&self) -> TransactionalService {
        TransactionalService::new(self.env(), None)
    }

    /// Construct the exposed service whose URL segment is `segment`.
    pub fn external_service(&self, segment: &str) -> Result<ExternalService, ServiceError> {
        let name = self
            .registry
            .external_services()
            .find(|name| segment_for(name) == segment)
            .ok_or_else(|| ServiceError::ServiceNotFound(segment.to_string()))?;
        self.registry.build(name, self.env(), None)
    }
}
