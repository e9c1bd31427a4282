//! Example application: the model in `model/` plus two services.
//!
//! `POST /api/v1/services/stock/ {"product_id": 1, "quantity": -2}` records a stock move and
//! adjusts the product in one transaction; a move that would take stock below zero rolls
//! both back. `GET /api/v1/services/stock/1` returns the product with its moves.
//!
//! Run from the repo root: `CONFIG_PATH=example_consumer/model cargo run -p example-consumer`

use async_trait::async_trait;
use modelrest::{
    server, ExternalService, Filter, Record, Service, ServiceActions, ServiceError, ServiceRegistry,
    Settings, Verb, VerbOptions,
};
use serde_json::{json, Value};

fn int_field(body: &Record, key: &str) -> Result<i64, ServiceError> {
    body.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| ServiceError::action(format!("{} must be an integer", key)))
}

/// Exposed as `/stock`.
#[derive(Default)]
struct StockService;

#[async_trait]
impl ServiceActions for StockService {
    async fn do_read(&self, svc: &ExternalService, opts: VerbOptions) -> Result<Value, ServiceError> {
        let id: i64 = opts
            .params
            .get("id")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ServiceError::action("invalid product id"))?;
        let mut product = svc
            .model_instance("product", Some(&json!(id)))
            .await?
            .ok_or_else(|| ServiceError::action("unknown product"))?;
        let moves = svc
            .record_set("stock_move", &Filter::new().eq("product_id", id))
            .await?;
        product["moves"] = Value::Array(moves);
        Ok(product)
    }

    async fn do_write(&self, svc: &ExternalService, opts: VerbOptions) -> Result<Value, ServiceError> {
        let body = opts.body_record();
        let product_id = int_field(&body, "product_id")?;
        let quantity = int_field(&body, "quantity")?;

        let product = svc
            .model_instance("product", Some(&json!(product_id)))
            .await?
            .ok_or_else(|| ServiceError::action("unknown product"))?;

        // The move is written by a second service enlisted in this transaction.
        let log = svc.service("StockMoveService", Some(svc.context().clone()))?;
        let moved = log
            .call(Verb::Write, VerbOptions::new().body(json!({ "product_id": product_id, "quantity": quantity })))
            .await?;

        let stock = product["stock"].as_i64().unwrap_or(0) + quantity;
        if stock < 0 {
            return Err(ServiceError::action("insufficient stock"));
        }
        let update: Record = [("id".to_string(), json!(product_id)), ("stock".to_string(), json!(stock))]
            .into_iter()
            .collect();
        let product = svc
            .save_model_instance("product", &update)
            .await?
            .ok_or_else(|| ServiceError::action("unknown product"))?;
        tracing::info!(product_id, quantity, stock, "stock moved");
        Ok(json!({ "product": product, "move": moved }))
    }
}

/// Internal: not routed, only called by other services.
#[derive(Default)]
struct StockMoveService;

#[async_trait]
impl ServiceActions for StockMoveService {
    async fn do_write(&self, svc: &ExternalService, opts: VerbOptions) -> Result<Value, ServiceError> {
        svc.create_model_instance("stock_move", &opts.body_record()).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    server::init_tracing();
    let settings = Settings::from_env()?;

    let mut registry = ServiceRegistry::new();
    registry.register_default::<StockService>("StockService", true);
    registry.register_default::<StockMoveService>("StockMoveService", false);

    server::serve(settings, registry).await
}
