//! Startup registration table of named services.

use super::base::ServiceEnv;
use super::context::SharedContext;
use super::external::{ExternalService, ServiceActions};
use crate::error::ServiceError;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ServiceFactory = Arc<dyn Fn() -> Arc<dyn ServiceActions> + Send + Sync>;

struct Registration {
    factory: ServiceFactory,
    exposed: bool,
}

/// Service name to constructor. Populated once at startup, then shared read-only.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Registration>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`. `exposed` services get HTTP routes; the others are only reachable from
    /// other services. Registering a name again replaces the earlier entry.
    pub fn register<F>(&mut self, name: impl Into<String>, exposed: bool, factory: F)
    where
        F: Fn() -> Arc<dyn ServiceActions> + Send + Sync + 'static,
    {
        let name = name.into();
        let entry = Registration {
            factory: Arc::new(factory),
            exposed,
        };
        if self.services.insert(name.clone(), entry).is_some() {
            tracing::warn!(service = %name, "service registered twice, keeping the last one");
        }
    }

    pub fn register_default<T>(&mut self, name: impl Into<String>, exposed: bool)
    where
        T: ServiceActions + Default + 'static,
    {
        self.register(name, exposed, || Arc::new(T::default()) as Arc<dyn ServiceActions>);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Names of services that get HTTP routes, in name order.
    pub fn external_services(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|(_, r)| r.exposed)
            .map(|(name, _)| name.as_str())
    }

    /// Construct `name` with the given context, or a fresh one.
    pub fn build(
        &self,
        name: &str,
        env: ServiceEnv,
        context: Option<SharedContext>,
    ) -> Result<ExternalService, ServiceError> {
        let entry = self
            .services
            .get(name)
            .ok_or_else(|| ServiceError::ServiceNotFound(name.to_string()))?;
        Ok(ExternalService::new(name, env, context, (entry.factory)()))
    }
}

/// URL segment for a service name: lower case, first `service` removed.
pub fn segment_for(name: &str) -> String {
    name.to_lowercase().replacen("service", "", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Service;
    use crate::test_support::{memory_store, WidgetActions};

    #[derive(Default)]
    struct Internal;
    impl ServiceActions for Internal {}

    #[test]
    fn segments() {
        assert_eq!(segment_for("WidgetService"), "widget");
        assert_eq!(segment_for("Orders"), "orders");
        assert_eq!(segment_for("ServiceDeskService"), "deskservice");
    }

    #[test]
    fn lists_only_exposed_services() {
        let mut registry = ServiceRegistry::new();
        registry.register_default::<WidgetActions>("WidgetService", true);
        registry.register_default::<Internal>("Internal", false);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Internal", "WidgetService"]);
        assert_eq!(registry.external_services().collect::<Vec<_>>(), vec!["WidgetService"]);
        assert!(registry.contains("Internal"));
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = ServiceRegistry::new();
        registry.register_default::<WidgetActions>("Svc", true);
        registry.register_default::<Internal>("Svc", false);
        assert_eq!(registry.external_services().count(), 0);
    }

    #[test]
    fn build_gives_each_instance_a_fresh_context() {
        let mut registry = ServiceRegistry::new();
        registry.register_default::<WidgetActions>("WidgetService", true);
        let registry = Arc::new(registry);
        let env = ServiceEnv::new(Arc::new(memory_store()), registry.clone());
        let a = registry.build("WidgetService", env.clone(), None).unwrap();
        let b = registry.build("WidgetService", env.clone(), None).unwrap();
        assert_eq!(a.name(), "WidgetService");
        assert!(!Arc::ptr_eq(a.context(), b.context()));
        assert!(matches!(
            registry.build("Nope", env, None),
            Err(ServiceError::ServiceNotFound(_))
        ));
    }
}
