//! Probe waves against the load-balancing strategies under test.
//!
//! Three wave shapes, run per endpoint by [`LoadDriver::run_all`]:
//! single request, bulk-concurrent, and timed-duration stress. Every probe
//! outcome is reported to the relay's ingress endpoint as it happens; network
//! failures are counted and never abort the run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::DriverError;
use super::report::{EndpointSummary, MonitoringEvent, RunResults};
use super::stats::LatencyStats;
use crate::ports::PortAssignment;

/// The balancing strategies under test, as (name, path prefix) pairs.
pub const ENDPOINTS: [(&str, &str); 4] = [
    ("round-robin", "/round-robin/"),
    ("least-conn", "/least-conn/"),
    ("weighted-least-conn", "/weighted-least-conn/"),
    ("ip-hash", "/ip-hash/"),
];

/// Backend banner substrings and the names they map to.
const BACKENDS: [(&str, &str); 3] = [
    ("Web Server 1", "web1"),
    ("Web Server 2", "web2"),
    ("Web Server 3", "web3"),
];

/// Identify which backend served a response by its body banner.
pub fn classify_backend(body: &str) -> Option<&'static str> {
    BACKENDS
        .iter()
        .find(|(banner, _)| body.contains(banner))
        .map(|(_, name)| *name)
}

/// Load driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Base URL of the load balancer under test
    pub base_url: String,
    /// Path to the relay's discovery file
    pub ports_file: PathBuf,
    /// Requests per bulk-concurrent wave
    pub requests_per_wave: usize,
    /// Concurrent workers in a bulk wave
    pub concurrency: usize,
    /// Duration of the stress wave
    pub stress_duration: Duration,
    /// Per-request transport timeout
    pub request_timeout: Duration,
    /// Directory the results file is written into
    pub results_dir: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:80".to_string(),
            ports_file: PathBuf::from(crate::ports::DISCOVERY_FILE),
            requests_per_wave: 100,
            concurrency: 10,
            stress_duration: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            results_dir: PathBuf::from("."),
        }
    }
}

/// Outcome of one timed-duration stress wave.
#[derive(Debug)]
pub struct StressSummary {
    pub total_requests: usize,
    pub errors: usize,
    pub requests_per_second: f64,
    pub latency: LatencyStats,
}

/// Drives probe traffic and accumulates per-run aggregates.
pub struct LoadDriver {
    client: reqwest::Client,
    config: DriverConfig,
    /// Relay ingress URL, if the discovery file was readable at startup.
    ingress_url: Option<String>,
    server_responses: Mutex<BTreeMap<String, u64>>,
    results: Mutex<BTreeMap<String, EndpointSummary>>,
}

impl LoadDriver {
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        // A missing discovery file is not fatal: the run proceeds without
        // live reporting, matching the relay-optional contract.
        let ingress_url = match PortAssignment::read_from(&config.ports_file) {
            Ok(ports) => {
                let url = format!("http://localhost:{}/monitoring/update", ports.http_port);
                info!("Reporting observations to {}", url);
                Some(url)
            }
            Err(e) => {
                warn!("Relay discovery failed, running without reporting: {}", e);
                None
            }
        };

        let mut server_responses = BTreeMap::new();
        for (_, name) in BACKENDS {
            server_responses.insert(name.to_string(), 0);
        }

        Ok(Self {
            client,
            config,
            ingress_url,
            server_responses: Mutex::new(server_responses),
            results: Mutex::new(BTreeMap::new()),
        })
    }

    fn endpoint_path(endpoint: &str) -> Result<&'static str, DriverError> {
        ENDPOINTS
            .iter()
            .find(|(name, _)| *name == endpoint)
            .map(|(_, path)| *path)
            .ok_or_else(|| DriverError::UnknownEndpoint(endpoint.to_string()))
    }

    /// POST one observation to the relay. Reporting failures are logged and
    /// swallowed so a dead relay cannot sink a test run.
    async fn report(&self, event: MonitoringEvent) {
        let Some(url) = &self.ingress_url else {
            return;
        };
        if let Err(e) = self.client.post(url).json(&event).send().await {
            warn!("Failed to report observation: {}", e);
        }
    }

    /// Issue one timed GET against `endpoint`. Returns the response time in
    /// milliseconds on success, `None` on a failed or errored probe.
    pub async fn single_request(&self, endpoint: &str) -> Result<Option<f64>, DriverError> {
        let path = Self::endpoint_path(endpoint)?;
        let url = format!("{}{}", self.config.base_url, path);

        let start = Instant::now();
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    info!("{}: failed with status {}", endpoint, status);
                    self.report(MonitoringEvent::failed(endpoint, status.as_u16()))
                        .await;
                    return Ok(None);
                }

                match response.text().await {
                    Ok(body) => {
                        let response_time = start.elapsed().as_secs_f64() * 1000.0;
                        let server = classify_backend(&body);
                        if let Some(server) = server {
                            let mut counts = self
                                .server_responses
                                .lock()
                                .expect("server_responses lock poisoned");
                            *counts.entry(server.to_string()).or_insert(0) += 1;
                        }

                        debug!("{}: {:.2}ms from {:?}", endpoint, response_time, server);
                        self.report(MonitoringEvent::success(endpoint, server, response_time))
                            .await;
                        Ok(Some(response_time))
                    }
                    Err(e) => {
                        self.report(MonitoringEvent::error(endpoint, e.to_string()))
                            .await;
                        Ok(None)
                    }
                }
            }
            Err(e) => {
                info!("{}: request error: {}", endpoint, e);
                self.report(MonitoringEvent::error(endpoint, e.to_string()))
                    .await;
                Ok(None)
            }
        }
    }

    /// Bulk-concurrent wave: `requests_per_wave` probes spread over
    /// `concurrency` workers. Aggregates are reported to the relay and kept
    /// for the results file.
    pub async fn load_test(self: &Arc<Self>, endpoint: &str) -> Result<LatencyStats, DriverError> {
        // Validate up front so workers cannot fail on an unknown name.
        Self::endpoint_path(endpoint)?;

        info!(
            "Load testing {} with {} requests ({} concurrent)",
            endpoint, self.config.requests_per_wave, self.config.concurrency
        );

        let issued = Arc::new(AtomicUsize::new(0));
        let total = self.config.requests_per_wave;

        let mut workers = Vec::with_capacity(self.config.concurrency);
        for _ in 0..self.config.concurrency {
            let driver = Arc::clone(self);
            let issued = Arc::clone(&issued);
            let endpoint = endpoint.to_string();
            workers.push(tokio::spawn(async move {
                let mut local = LatencyStats::new();
                while issued.fetch_add(1, Ordering::SeqCst) < total {
                    if let Ok(Some(ms)) = driver.single_request(&endpoint).await {
                        local.record(ms);
                    }
                }
                local
            }));
        }

        let mut stats = LatencyStats::new();
        for worker in workers {
            match worker.await {
                Ok(local) => stats.merge(&local),
                Err(e) => warn!("Load test worker panicked: {}", e),
            }
        }

        if let (Some(avg), Some(max), Some(min)) = (stats.mean(), stats.max(), stats.min()) {
            info!(
                "Results for {}: avg={:.2}ms max={:.2}ms min={:.2}ms n={}",
                endpoint,
                avg,
                max,
                min,
                stats.len()
            );

            self.report(MonitoringEvent::LoadTestResults {
                endpoint: endpoint.to_string(),
                avg_time: avg,
                max_time: max,
                min_time: min,
                total_requests: stats.len(),
            })
            .await;

            self.results
                .lock()
                .expect("results lock poisoned")
                .insert(endpoint.to_string(), EndpointSummary { avg, max, min });
        } else {
            warn!("Load test for {} produced no successful requests", endpoint);
        }

        Ok(stats)
    }

    /// Timed-duration wave: sequential probes until the clock runs out.
    pub async fn stress_test(
        &self,
        endpoint: &str,
        duration: Duration,
    ) -> Result<StressSummary, DriverError> {
        Self::endpoint_path(endpoint)?;
        info!("Stress testing {} for {:?}", endpoint, duration);

        let start = Instant::now();
        let mut latency = LatencyStats::new();
        let mut errors = 0;

        while start.elapsed() < duration {
            match self.single_request(endpoint).await? {
                Some(ms) => latency.record(ms),
                None => errors += 1,
            }
        }

        let total_requests = latency.len();
        let requests_per_second = total_requests as f64 / duration.as_secs_f64();
        info!(
            "Stress results for {}: {} requests, {} errors, {:.2} req/s",
            endpoint, total_requests, errors, requests_per_second
        );

        Ok(StressSummary {
            total_requests,
            errors,
            requests_per_second,
            latency,
        })
    }

    /// Snapshot of everything the run has learned so far.
    pub fn results(&self) -> RunResults {
        RunResults {
            load_balancing_results: self.results.lock().expect("results lock poisoned").clone(),
            server_distribution: self
                .server_responses
                .lock()
                .expect("server_responses lock poisoned")
                .clone(),
            timestamp: RunResults::now_timestamp(),
        }
    }

    /// Run the full suite against every endpoint, then persist the results
    /// file. Returns the path it was written to.
    pub async fn run_all(self: &Arc<Self>) -> Result<PathBuf, DriverError> {
        info!("Starting load-balancer test run against {}", self.config.base_url);

        for (endpoint, _) in ENDPOINTS {
            info!("==== Testing {} ====", endpoint);

            self.single_request(endpoint).await?;
            self.load_test(endpoint).await?;
            self.stress_test(endpoint, self.config.stress_duration)
                .await?;

            // Brief pause between endpoints so waves do not bleed together.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let path = self.results().save(&self.config.results_dir)?;
        info!("Results saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_with(config: DriverConfig) -> Arc<LoadDriver> {
        Arc::new(LoadDriver::new(config).unwrap())
    }

    fn local_config(base_url: String) -> DriverConfig {
        DriverConfig {
            base_url,
            // Point discovery at a path that never exists so tests run
            // without a relay.
            ports_file: PathBuf::from("/nonexistent/server_ports.json"),
            requests_per_wave: 20,
            concurrency: 4,
            stress_duration: Duration::from_millis(200),
            request_timeout: Duration::from_secs(2),
            results_dir: PathBuf::from("."),
        }
    }

    #[test]
    fn test_classify_backend() {
        assert_eq!(classify_backend("<h1>Hello from Web Server 1</h1>"), Some("web1"));
        assert_eq!(classify_backend("Web Server 3 reporting"), Some("web3"));
        assert_eq!(classify_backend("nginx default page"), None);
    }

    #[test]
    fn test_endpoint_table() {
        assert_eq!(ENDPOINTS.len(), 4);
        assert!(LoadDriver::endpoint_path("round-robin").is_ok());
        assert!(LoadDriver::endpoint_path("ip-hash").is_ok());
        assert!(matches!(
            LoadDriver::endpoint_path("no-such-strategy"),
            Err(DriverError::UnknownEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_single_request_classifies_backend() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/round-robin/")
            .with_status(200)
            .with_body("<html>Hello from Web Server 2</html>")
            .create_async()
            .await;

        let driver = driver_with(local_config(server.url()));
        let ms = driver.single_request("round-robin").await.unwrap();
        assert!(ms.is_some());

        mock.assert_async().await;
        let results = driver.results();
        assert_eq!(results.server_distribution["web2"], 1);
        assert_eq!(results.server_distribution["web1"], 0);
    }

    #[tokio::test]
    async fn test_single_request_non_200_counts_as_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ip-hash/")
            .with_status(502)
            .create_async()
            .await;

        let driver = driver_with(local_config(server.url()));
        let ms = driver.single_request("ip-hash").await.unwrap();
        assert!(ms.is_none());
        assert_eq!(driver.results().server_distribution["web1"], 0);
    }

    #[tokio::test]
    async fn test_single_request_connection_refused_is_counted_not_fatal() {
        // Unroutable local port: connection refused is an error observation.
        let driver = driver_with(local_config("http://127.0.0.1:9".to_string()));
        let ms = driver.single_request("least-conn").await.unwrap();
        assert!(ms.is_none());
    }

    #[tokio::test]
    async fn test_load_test_aggregates_and_records_summary() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/least-conn/")
            .with_status(200)
            .with_body("Web Server 1")
            .expect_at_least(20)
            .create_async()
            .await;

        let driver = driver_with(local_config(server.url()));
        let stats = driver.load_test("least-conn").await.unwrap();
        assert_eq!(stats.len(), 20);

        let results = driver.results();
        let summary = &results.load_balancing_results["least-conn"];
        assert!(summary.min <= summary.avg && summary.avg <= summary.max);
        assert_eq!(results.server_distribution["web1"], 20);
    }

    #[tokio::test]
    async fn test_stress_test_counts_errors_without_aborting() {
        // No server listening: every probe errors, the wave still completes.
        let driver = driver_with(local_config("http://127.0.0.1:9".to_string()));
        let summary = driver
            .stress_test("round-robin", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(summary.total_requests, 0);
        assert!(summary.errors > 0);
    }
}
