mod common;

use axum::http::StatusCode;
use common::{app, TestApp};
use serde_json::{json, Value};

async fn seed(app: &TestApp) {
    for (name, color) in [("a", "red"), ("b", "blue"), ("c", "red")] {
        let (status, _) = app
            .send("POST", "/api/v1/widgets", Some(json!({"name": name, "color": color, "secret": "s"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

fn names(body: &Value) -> Vec<&str> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn create_strips_sensitive_columns() {
    let app = app();
    let (status, body) = app
        .send("POST", "/api/v1/widgets", Some(json!({"name": "a", "secret": "hidden"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"data": {"id": 1, "name": "a", "color": null}}));
}

#[tokio::test]
async fn create_is_validated_before_touching_the_store() {
    let app = app();
    let (status, body) = app.send("POST", "/api/v1/widgets", Some(json!({"color": "red"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], json!("validation_error"));
    assert_eq!(body["error"]["message"], json!("validation: name is required"));

    let (status, _) = app.send("POST", "/api/v1/widgets", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.stats().begun(), 0);
}

#[tokio::test]
async fn list_filters_from_query_and_body() {
    let app = app();
    seed(&app).await;

    let (status, body) = app.send("GET", "/api/v1/widgets?color=red&limit=1&offset=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["c"]);
    assert_eq!(body["meta"], json!({"count": 1}));

    let (_, body) = app
        .send("POST", "/api/v1/widgets/all", Some(json!({"where": {"color": "red"}})))
        .await;
    assert_eq!(names(&body), vec!["a", "c"]);
    assert!(body["data"][0].get("secret").is_none());

    let (_, body) = app.send("POST", "/api/v1/widgets/all", Some(json!({"color": "blue"}))).await;
    assert_eq!(names(&body), vec!["b"]);

    let (status, _) = app.send("POST", "/api/v1/widgets/all", Some(json!({"limit": "ten"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn read_update_delete_by_id() {
    let app = app();
    seed(&app).await;

    let (status, body) = app.send("GET", "/api/v1/widgets/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("b"));

    let (status, body) = app
        .send("PATCH", "/api/v1/widgets/2", Some(json!({"color": "green", "id": 99})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"id": 2, "name": "b", "color": "green"}));

    let (status, body) = app
        .send("PATCH", "/api/v1/widgets/2", Some(json!({"name": "x".repeat(21)})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["message"], json!("validation: name must be at most 20 characters"));

    let (status, body) = app.send("DELETE", "/api/v1/widgets/2", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = app.send("DELETE", "/api/v1/widgets/2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("GET", "/api/v1/widgets/2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("PATCH", "/api/v1/widgets/2", Some(json!({"color": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_ids_and_unknown_paths() {
    let app = app();
    let (status, _) = app.send("GET", "/api/v1/widgets/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app.send("GET", "/api/v1/gadgets", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));
}

#[tokio::test]
async fn operations_are_limited_per_entity() {
    let app = app();
    let (status, body) = app.send("GET", "/api/v1/audit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"data": [], "meta": {"count": 0}}));

    let (status, body) = app.send("POST", "/api/v1/audit", Some(json!({"action": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("bad request: create not allowed"));
}

#[tokio::test]
async fn every_request_ends_its_transaction() {
    let app = app();
    seed(&app).await;
    app.send("GET", "/api/v1/widgets/1", None).await;
    app.send("GET", "/api/v1/widgets/9", None).await;
    let stats = app.store.stats();
    assert_eq!(stats.begun(), 5);
    assert_eq!(stats.committed() + stats.rolled_back(), 5);
}
