//! HTTP status surface for database routing

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::FakeDataSource;
use tracking_core::database::{DatabaseHealthMonitor, RoutingState};
use tracking_core::web::{create_app, AppState};

fn app() -> (Router, FakeDataSource, Arc<DatabaseHealthMonitor<FakeDataSource>>) {
    let replica = FakeDataSource::new("replica");
    let monitor = Arc::new(DatabaseHealthMonitor::new(
        FakeDataSource::new("primary"),
        replica.clone(),
        Arc::new(RoutingState::new()),
        true,
        Duration::from_secs(30),
    ));
    (create_app(AppState::new(monitor.clone())), replica, monitor)
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_reports_route_and_flags() {
    let (app, _, _) = app();
    let (status, body) = call(app, "GET", "/api/database/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentRoute"], "REPLICA");
    assert_eq!(body["primaryHealthy"], true);
    assert_eq!(body["replicaHealthy"], true);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_status_includes_strategy() {
    let (app, _, _) = app();
    let (status, body) = call(app, "GET", "/api/database/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failoverEnabled"], true);
    assert_eq!(body["autoRecovery"], true);
    assert_eq!(body["checkIntervalSeconds"], 30);
    assert_eq!(body["strategy"]["preferred"], "REPLICA");
    assert_eq!(body["strategy"]["fallback"], "PRIMARY");
}

#[tokio::test]
async fn test_force_failover_then_switch_back() {
    let (app, _, monitor) = app();

    let (status, body) = call(app.clone(), "POST", "/api/database/failover/primary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentRoute"], "PRIMARY");
    assert!(body["message"].is_string());

    let (status, body) = call(app, "POST", "/api/database/switch/replica").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentRoute"], "REPLICA");
    assert_eq!(monitor.status().current_route.as_str(), "REPLICA");
}

#[tokio::test]
async fn test_switch_to_unhealthy_replica_is_conflict() {
    let (app, replica, monitor) = app();
    replica.set_up(false);
    monitor.tick().await;

    let (status, body) = call(app, "POST", "/api/database/switch/replica").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    assert_eq!(monitor.status().current_route.as_str(), "PRIMARY");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (app, _, _) = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/database/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
