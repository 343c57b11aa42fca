use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, get_service},
};
use lbmon::config::Config;
use lbmon::ports::{DISCOVERY_FILE, PortAssignment, find_free_port};
use lbmon::relay::{AppState, ClientRegistry, monitoring_routes, ws_handler};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connected_clients: usize,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connected_clients: state.registry.len().await,
        uptime_seconds: uptime,
    })
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus handle not initialized");
    handle.render()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record server start time
    START_TIME.set(Instant::now()).ok();

    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = setup_prometheus_metrics();
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lbmon=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();

    // Allocate the two ports from their disjoint ranges; exhaustion is fatal.
    let http_port = find_free_port(config.http_port_range.clone())?;
    let ws_port = find_free_port(config.ws_port_range.clone())?;
    let ports = PortAssignment { http_port, ws_port };
    info!("Using ports - HTTP: {}, WebSocket: {}", http_port, ws_port);

    // Persist the assignment so collaborators can discover the relay.
    let discovery_path = config.discovery_dir.join(DISCOVERY_FILE);
    ports.write_to(&discovery_path)?;
    info!("Wrote discovery file: {}", discovery_path.display());

    let registry = Arc::new(ClientRegistry::new(config.broadcast.clone()));
    let app_state = AppState::new(registry, ports);

    // Periodic uptime gauge (connection gauges are updated by the registry)
    tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
            metrics::gauge!("lbmon_uptime_seconds").set(uptime as f64);
        }
    });

    // Build CORS layer (the discovery endpoint requires a wildcard origin)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .merge(monitoring_routes())
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Serve the dashboard assets at `/` when present. Static serving is
    // GET-only; a POST to any unrouted path must come back 404, not 405.
    let app = if config.dashboard_dir.exists() {
        info!("Serving dashboard from: {:?}", config.dashboard_dir);
        let index_path = config.dashboard_dir.join("index.html");
        let serve_dir =
            ServeDir::new(&config.dashboard_dir).not_found_service(ServeFile::new(&index_path));
        app.fallback_service(get_service(serve_dir).fallback(|| async { StatusCode::NOT_FOUND }))
    } else {
        warn!(
            "Dashboard directory not found: {:?} - static serving disabled",
            config.dashboard_dir
        );
        app
    };

    // WebSocket server on its own port; the browser connects to the root path.
    let ws_app = Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let ws_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, ws_port));
    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await?;
    info!("WebSocket server listening on ws://{}", ws_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(ws_listener, ws_app).await {
            error!("WebSocket server failed: {}", e);
            std::process::exit(1);
        }
    });

    let http_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, http_port));
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on http://{}", http_addr);
    axum::serve(http_listener, app).await?;

    Ok(())
}
