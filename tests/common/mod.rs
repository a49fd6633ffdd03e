#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use gatehouse::api::{create_router, AppState};
use gatehouse::service::Gatehouse;
use gatehouse::storage::{MemoryStorage, Storage};

/// Router over a fresh in-memory backend.
pub async fn test_app() -> Router {
    app_with_storage(Arc::new(MemoryStorage::new())).await
}

/// Router over a caller-supplied backend (to simulate restarts and shared
/// durable state).
pub async fn app_with_storage(storage: Arc<dyn Storage>) -> Router {
    let service = Gatehouse::load(storage, Duration::from_secs(5))
        .await
        .expect("could not load registry");
    create_router(Arc::new(AppState {
        service,
        version: "0.0.0-test".to_string(),
    }))
}

/// Issue one request and decode the JSON response.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

pub async fn send_ok(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Value {
    let (status, value) = send(app, method, uri, body).await;
    assert_eq!(status, StatusCode::OK, "unexpected response: {value}");
    value
}

/// Run a check and return the decision string.
pub async fn check(
    app: &Router,
    actor: (&str, &str),
    actor_attributes: Value,
    env_attributes: Value,
    target: (&str, &str, &str),
) -> String {
    let (target_name, target_type, target_action) = target;
    let body = json!({
        "actor": {
            "name": actor.0,
            "typestr": actor.1,
            "attributes": actor_attributes,
        },
        "env_attributes": env_attributes,
        "target_name": target_name,
        "target_type": target_type,
        "target_action": target_action,
    });

    let value = send_ok(app, "POST", "/v1/check", Some(body)).await;
    value["decision"].as_str().expect("missing decision").to_string()
}

/// Shorthand for a check with no asserted attributes.
pub async fn check_plain(app: &Router, actor: (&str, &str), target: (&str, &str, &str)) -> String {
    check(app, actor, json!({}), json!({}), target).await
}
