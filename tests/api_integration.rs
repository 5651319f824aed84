//! HTTP API integration tests
//!
//! Exercise the full router with the memory registry and the local delivery
//! channel. Requests go through `tower::ServiceExt::oneshot`, so no port is
//! bound.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use weather_fanout_service::config::{RedisConfig, Settings};
use weather_fanout_service::connection::{ConnectionHub, ConnectionId};
use weather_fanout_service::delivery::LocalDeliveryChannel;
use weather_fanout_service::fanout::{FanoutEngine, FanoutOptions};
use weather_fanout_service::redis::RedisPool;
use weather_fanout_service::registry::{
    ConnectionRegistry, MemoryConnectionRegistry, RegistryError,
};
use weather_fanout_service::server::{create_app, AppState};
use weather_fanout_service::websocket::OutboundMessage;

/// Registry whose store is always down
struct DownRegistry;

#[async_trait]
impl ConnectionRegistry for DownRegistry {
    async fn upsert(&self, _id: &ConnectionId) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("connection refused".to_string()))
    }

    async fn remove(&self, _id: &ConnectionId) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("connection refused".to_string()))
    }

    async fn list_all(&self) -> Result<Vec<ConnectionId>, RegistryError> {
        Err(RegistryError::Unavailable("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "down"
    }
}

struct TestEnvironment {
    app: Router,
    hub: Arc<ConnectionHub>,
    registry: Arc<MemoryConnectionRegistry>,
}

fn create_app_with_registry(
    registry: Arc<dyn ConnectionRegistry>,
    hub: Arc<ConnectionHub>,
) -> Router {
    let engine = Arc::new(FanoutEngine::new(
        registry,
        Arc::new(LocalDeliveryChannel::new(hub.clone())),
        FanoutOptions::default(),
    ));
    create_app(AppState::new(Settings::default(), hub, engine, None))
}

fn create_test_environment() -> TestEnvironment {
    let hub = Arc::new(ConnectionHub::new());
    let registry = Arc::new(MemoryConnectionRegistry::new());
    let app = create_app_with_registry(registry.clone(), hub.clone());
    TestEnvironment { app, hub, registry }
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

// ============================================================================
// Lifecycle callbacks
// ============================================================================

#[tokio::test]
async fn test_connect_registers_gateway_connection() {
    let env = create_test_environment();
    let event = json!({"requestContext": {"connectionId": "Lx3kQc0AAMCJTaA="}});

    let (status, body) = send_json(
        &env.app,
        post("/api/v1/connections/connect", event.to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "connected"}));
    assert!(env.registry.contains(&ConnectionId::from("Lx3kQc0AAMCJTaA=")));
}

#[tokio::test]
async fn test_disconnect_deregisters_connection() {
    let env = create_test_environment();
    env.registry.upsert(&ConnectionId::from("c1")).await.unwrap();

    let (status, body) = send_json(
        &env.app,
        post("/api/v1/connections/disconnect", json!({"connectionId": "c1"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "disconnected"}));
    assert!(env.registry.is_empty());

    // Disconnecting an unknown id is still a success
    let (status, _) = send(
        &env.app,
        post("/api/v1/connections/disconnect", json!({"id": "never-seen"}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_lifecycle_bodies_still_succeed() {
    let env = create_test_environment();

    for body in ["not json", "{}", r#"{"id": "   "}"#, ""] {
        let (status, response) =
            send_json(&env.app, post("/api/v1/connections/connect", body)).await;
        assert_eq!(status, StatusCode::OK, "body {:?}", body);
        assert_eq!(response["status"], "connected");
    }

    assert!(env.registry.is_empty());
}

#[tokio::test]
async fn test_lifecycle_succeeds_when_registry_is_down() {
    let app = create_app_with_registry(Arc::new(DownRegistry), Arc::new(ConnectionHub::new()));

    let (status, _) = send(
        &app,
        post("/api/v1/connections/connect", json!({"id": "c1"}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        post("/api/v1/connections/disconnect", json!({"id": "c1"}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Broadcast
// ============================================================================

#[tokio::test]
async fn test_broadcast_reaches_local_socket_and_evicts_stale() {
    let env = create_test_environment();

    let live = ConnectionId::from("live");
    let (tx, mut rx) = mpsc::channel(4);
    env.hub.attach(live.clone(), tx);
    env.registry.upsert(&live).await.unwrap();
    // Registered but no socket in this process
    env.registry.upsert(&ConnectionId::from("ghost")).await.unwrap();

    let message = json!({"type": "weather", "data": {"temp_c": 12.5, "ts": 1700000000}});
    let (status, report) =
        send_json(&env.app, post("/api/v1/broadcast", message.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["attempted"], 2);
    assert_eq!(report["delivered_count"], 1);
    assert_eq!(report["stale_count"], 1);
    assert_eq!(report["transient_count"], 0);

    assert!(env.registry.contains(&live));
    assert!(!env.registry.contains(&ConnectionId::from("ghost")));

    match rx.recv().await {
        Some(OutboundMessage::Payload(bytes)) => {
            let received: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(received, message);
        }
        other => panic!("expected payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_broadcast_with_no_connections() {
    let env = create_test_environment();

    let (status, report) = send_json(
        &env.app,
        post("/api/v1/broadcast", json!({"type": "weather"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["attempted"], 0);
}

#[tokio::test]
async fn test_broadcast_rejects_empty_type() {
    let env = create_test_environment();

    let (status, body) = send_json(
        &env.app,
        post("/api/v1/broadcast", json!({"type": " ", "data": {}}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_broadcast_registry_down_returns_503() {
    let app = create_app_with_registry(Arc::new(DownRegistry), Arc::new(ConnectionHub::new()));

    let (status, body) = send_json(
        &app,
        post("/api/v1/broadcast", json!({"type": "weather"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "REGISTRY_UNAVAILABLE");
}

// ============================================================================
// Health, stats & metrics
// ============================================================================

#[tokio::test]
async fn test_health_reports_backend_and_channel() {
    let env = create_test_environment();

    let (status, body) = send_json(&env.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["registry_backend"], "memory");
    assert_eq!(body["delivery_channel"], "websocket");
    assert_eq!(body["local_connections"], 0);
    assert!(body.get("redis").is_none());
}

#[tokio::test]
async fn test_health_degraded_until_redis_connects() {
    let hub = Arc::new(ConnectionHub::new());
    let engine = Arc::new(FanoutEngine::new(
        Arc::new(MemoryConnectionRegistry::new()),
        Arc::new(LocalDeliveryChannel::new(hub.clone())),
        FanoutOptions::default(),
    ));
    // Opening a client does not dial, so the pool starts disconnected
    let pool = Arc::new(RedisPool::from_config(&RedisConfig::default()).unwrap());
    let app = create_app(AppState::new(Settings::default(), hub, engine, Some(pool)));

    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["redis"], "disconnected");

    let (_, stats) = send_json(&app, get("/stats")).await;
    assert_eq!(stats["redis"]["status"], "disconnected");
    assert_eq!(stats["redis"]["circuit_breaker_state"], "closed");
    assert_eq!(stats["redis"]["connects"], 0);
}

#[tokio::test]
async fn test_stats_include_fanout_totals() {
    let env = create_test_environment();
    send(
        &env.app,
        post("/api/v1/connections/connect", json!({"id": "c1"}).to_string()),
    )
    .await;
    send(
        &env.app,
        post("/api/v1/broadcast", json!({"type": "weather"}).to_string()),
    )
    .await;

    let (status, body) = send_json(&env.app, get("/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fanout"]["connects"], 1);
    assert_eq!(body["fanout"]["passes"], 1);
    // c1 has no local socket, so the pass evicted it
    assert_eq!(body["fanout"]["stale_removed"], 1);
    assert_eq!(body["registry"]["connections"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let env = create_test_environment();
    send(
        &env.app,
        post("/api/v1/broadcast", json!({"type": "weather"}).to_string()),
    )
    .await;

    let (status, body) = send(&env.app, get("/metrics")).await;
    let text = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("fanout_broadcast_passes_total"));
    assert!(text.contains("fanout_http_requests_total"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let env = create_test_environment();
    let (status, _) = send(&env.app, get("/api/v1/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
