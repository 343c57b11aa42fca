//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{MethodRouter, get, get_service},
};
use lbmon::config::BroadcastConfig;
use lbmon::ports::PortAssignment;
use lbmon::relay::{AppState, ClientRegistry, monitoring_routes, ws_handler};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Static dashboard fallback, wired the way the relay binary wires it:
/// GET-only, with unrouted non-GET requests answered 404.
pub fn dashboard_fallback() -> MethodRouter {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../dashboard");
    let index_path = dir.join("index.html");
    let serve_dir = ServeDir::new(&dir).not_found_service(ServeFile::new(&index_path));
    get_service(serve_dir).fallback(|| async { StatusCode::NOT_FOUND })
}

/// Relay state with test-friendly broadcast tuning.
pub fn create_test_state() -> AppState {
    let registry = Arc::new(ClientRegistry::new(BroadcastConfig {
        channel_capacity: 16,
        send_timeout: Duration::from_millis(500),
    }));
    AppState::new(
        registry,
        PortAssignment {
            http_port: 8000,
            ws_port: 8101,
        },
    )
}

/// Create a test application router with state
pub fn create_test_app_with_state() -> (Router, AppState) {
    let app_state = create_test_state();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .merge(monitoring_routes())
        .with_state(app_state.clone())
        .layer(cors)
        .fallback_service(dashboard_fallback());

    (app, app_state)
}

/// Create a test application router with all routes configured
pub fn create_test_app() -> Router {
    create_test_app_with_state().0
}

/// A running relay: HTTP and WebSocket servers on ephemeral ports.
pub struct TestRelay {
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    pub state: AppState,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Start both relay servers on random ports, mirroring the binary's layout.
pub async fn start_test_relay() -> TestRelay {
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = http_listener.local_addr().unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    let registry = Arc::new(ClientRegistry::new(BroadcastConfig {
        channel_capacity: 16,
        send_timeout: Duration::from_millis(500),
    }));
    let state = AppState::new(
        registry,
        PortAssignment {
            http_port: http_addr.port(),
            ws_port: ws_addr.port(),
        },
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let http_app = monitoring_routes()
        .with_state(state.clone())
        .layer(cors)
        .fallback_service(dashboard_fallback());
    let ws_app = Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let handles = vec![
        tokio::spawn(async move {
            axum::serve(http_listener, http_app).await.unwrap();
        }),
        tokio::spawn(async move {
            axum::serve(ws_listener, ws_app).await.unwrap();
        }),
    ];

    // Give the servers time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestRelay {
        http_addr,
        ws_addr,
        state,
        handles,
    }
}
