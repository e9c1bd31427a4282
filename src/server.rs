//! Process bootstrap shared by the server binary and embedding applications.

use crate::config::{load_from_dir, resolve, ResolvedModel};
use crate::migration::apply_migrations;
use crate::routes::router;
use crate::service::ServiceRegistry;
use crate::settings::Settings;
use crate::state::AppState;
use crate::store::{DataStore, MemoryStore, PgStore};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` when set, otherwise `modelrest=info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modelrest=info")),
        )
        .init();
}

/// Load the model, connect the store (syncing the schema when asked) and assemble state.
pub async fn build_state(
    settings: &Settings,
    registry: ServiceRegistry,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let config = load_from_dir(&settings.config_path).await?;
    let model: Arc<ResolvedModel> = Arc::new(resolve(&config)?);
    tracing::info!(
        entities = model.entities.len(),
        exposed = model.exposed().count(),
        path = %settings.config_path.display(),
        "model loaded"
    );

    let store: Arc<dyn DataStore> = match &settings.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect(url)
                .await?;
            if settings.sync {
                apply_migrations(&pool, &config).await?;
            }
            Arc::new(PgStore::new(pool, model.clone()))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new(model.clone()))
        }
    };

    for name in registry.names() {
        tracing::info!(service = %name, "service registered");
    }
    Ok(AppState::new(store, model, Arc::new(registry)))
}

pub fn app(state: AppState, body_limit: usize) -> Router {
    router(state).layer(RequestBodyLimitLayer::new(body_limit))
}

/// Build state from `settings` and serve until the process stops.
pub async fn serve(settings: Settings, registry: ServiceRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&settings, registry).await?;
    let listener = TcpListener::bind(settings.socket_addr()?).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state, settings.body_limit)).await?;
    Ok(())
}
