pub mod registry;
pub mod routes;
pub mod websocket;

pub use registry::{ClientRegistry, SharedRegistry};
pub use routes::monitoring_routes;
pub use websocket::ws_handler;

use crate::ports::PortAssignment;

/// Shared application state for both HTTP and WebSocket servers.
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub ports: PortAssignment,
}

impl AppState {
    pub fn new(registry: SharedRegistry, ports: PortAssignment) -> Self {
        Self { registry, ports }
    }
}
