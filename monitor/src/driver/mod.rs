//! Load driver: generates probe traffic against the balanced web tier and
//! reports observations to the monitoring relay.

pub mod report;
pub mod runner;
pub mod stats;

pub use report::{MonitoringEvent, RunResults};
pub use runner::{DriverConfig, LoadDriver};
pub use stats::LatencyStats;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Port(#[from] crate::ports::PortError),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
}
