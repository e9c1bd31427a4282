//! modelrest: model-driven REST backend with transactional services.

pub mod config;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod server;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

mod test_support;

pub use config::{load_from_dir, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError, ServiceError, StoreError};
pub use migration::apply_migrations;
pub use routes::{common_routes, entity_routes, router, service_routes};
pub use service::{
    BaseService, ExecutionContext, ExternalService, Service, ServiceActions, ServiceEnv, ServiceRegistry,
    SharedContext, TransactionalService, Verb, VerbOptions,
};
pub use settings::Settings;
pub use state::AppState;
pub use store::{DataStore, Filter, MemoryStore, PgStore, Record, StoreTransaction};
