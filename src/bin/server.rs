//! Model-driven server: CRUD routes for the model in CONFIG_PATH, no custom services.
//! Applications with services call `modelrest::server::serve` with their own registry.

use modelrest::{server, ServiceRegistry, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    server::init_tracing();
    let settings = Settings::from_env()?;
    server::serve(settings, ServiceRegistry::new()).await
}
