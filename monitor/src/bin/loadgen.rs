//! Load driver binary: probes the balanced web tier and streams observations
//! to the monitoring relay.

use clap::Parser;
use lbmon::driver::{DriverConfig, LoadDriver};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lbmon-loadgen", version, about = "Load driver for a balanced web tier")]
struct Args {
    /// Base URL of the load balancer under test
    #[arg(long, env = "LB_BASE_URL", default_value = "http://localhost:80")]
    base_url: String,

    /// Path to the relay's discovery file
    #[arg(long, default_value = "server_ports.json")]
    ports_file: PathBuf,

    /// Requests per bulk-concurrent wave
    #[arg(long, default_value_t = 100)]
    requests: usize,

    /// Concurrent workers in a bulk wave
    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Stress wave duration in seconds
    #[arg(long, default_value_t = 10)]
    stress_secs: u64,

    /// Directory the results file is written into
    #[arg(long, default_value = ".")]
    results_dir: PathBuf,

    /// Test a single named strategy instead of the full suite
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lbmon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let stress_duration = Duration::from_secs(args.stress_secs);
    let results_dir = args.results_dir.clone();

    let config = DriverConfig {
        base_url: args.base_url,
        ports_file: args.ports_file,
        requests_per_wave: args.requests,
        concurrency: args.concurrency,
        stress_duration,
        results_dir: args.results_dir,
        ..DriverConfig::default()
    };

    let driver = Arc::new(LoadDriver::new(config)?);

    match args.endpoint {
        Some(endpoint) => {
            driver.single_request(&endpoint).await?;
            driver.load_test(&endpoint).await?;
            driver.stress_test(&endpoint, stress_duration).await?;
            let path = driver.results().save(&results_dir)?;
            info!("Results saved to {}", path.display());
        }
        None => {
            driver.run_all().await?;
        }
    }

    Ok(())
}
