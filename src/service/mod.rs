//! Transactional services: execution context, service variants, the verb protocol and the
//! registry of named services.

mod base;
mod context;
mod external;
mod registry;
mod transactional;
mod validation;

pub use base::{BaseService, Service, ServiceEnv};
pub use context::{ExecutionContext, SharedContext, Transaction};
pub use external::{ExternalService, ServiceActions, Verb, VerbOptions};
pub use registry::{segment_for, ServiceFactory, ServiceRegistry};
pub use transactional::TransactionalService;
pub use validation::RequestValidator;
