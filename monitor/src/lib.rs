//! lbmon library
//!
//! This module exports the relay and load-driver components for use in
//! integration tests and the two binaries.

pub mod config;
pub mod driver;
pub mod ports;
pub mod relay;

// Re-export commonly used types
pub use config::Config;
pub use driver::{DriverConfig, LoadDriver};
pub use ports::{PortAssignment, PortError, find_free_port};
pub use relay::{AppState, ClientRegistry};
