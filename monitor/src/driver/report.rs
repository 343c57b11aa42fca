//! Observation shapes POSTed to the relay's ingress endpoint, plus the
//! end-of-run results file.
//!
//! The relay treats these as opaque JSON; the shapes here are the contract
//! between the load driver and the browser dashboard.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::DriverError;

/// Outcome classification for a single probe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Success,
    Failed,
    Error,
}

/// One observation sent to the monitoring dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitoringEvent {
    /// A single probe request against one balancing strategy.
    Request {
        endpoint: String,
        status: RequestStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        server: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_time: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Aggregate of one bulk-concurrent wave.
    LoadTestResults {
        endpoint: String,
        avg_time: f64,
        max_time: f64,
        min_time: f64,
        total_requests: usize,
    },
}

impl MonitoringEvent {
    pub fn success(endpoint: &str, server: Option<&str>, response_time: f64) -> Self {
        Self::Request {
            endpoint: endpoint.to_string(),
            status: RequestStatus::Success,
            server: server.map(str::to_string),
            response_time: Some(response_time),
            status_code: None,
            error: None,
        }
    }

    pub fn failed(endpoint: &str, status_code: u16) -> Self {
        Self::Request {
            endpoint: endpoint.to_string(),
            status: RequestStatus::Failed,
            server: None,
            response_time: None,
            status_code: Some(status_code),
            error: None,
        }
    }

    pub fn error(endpoint: &str, error: String) -> Self {
        Self::Request {
            endpoint: endpoint.to_string(),
            status: RequestStatus::Error,
            server: None,
            response_time: None,
            status_code: None,
            error: Some(error),
        }
    }
}

/// Per-endpoint aggregate recorded in the results file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EndpointSummary {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

/// Everything a run learned, persisted at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    /// Endpoint name -> latency aggregate (BTreeMap for stable file output)
    pub load_balancing_results: BTreeMap<String, EndpointSummary>,
    /// Backend name -> number of responses attributed to it
    pub server_distribution: BTreeMap<String, u64>,
    pub timestamp: String,
}

impl RunResults {
    /// Write the results to `test_results_<timestamp>.json` under `dir` and
    /// return the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, DriverError> {
        let path = dir.join(format!("test_results_{}.json", self.timestamp));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Timestamp in the `YYYYMMDD_HHMMSS` form used in result file names.
    pub fn now_timestamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }
}
