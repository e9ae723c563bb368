use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use spinload_telemetry::{
    init_logging, serve_metrics, LogFormat, OutcomeMetrics, ShutdownSignal,
};
use spinload_worker::{start_server, AppState, RequestHandler, WorkerConfig, METRICS_PREFIX};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "spinload-worker", author, version, about = "Busy-spin RPC target service")]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Bind host for both RPC and metrics listeners
    #[arg(long)]
    host: Option<String>,

    /// RPC server port
    #[arg(long, alias = "grpc-port")]
    port: Option<u16>,

    /// Worker Prometheus metrics port (0 disables)
    #[arg(long, alias = "worker-metrics-port")]
    metrics_port: Option<u16>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_name = "pretty|json")]
    log_format: Option<LogFormat>,
}

fn apply_overrides(cli: &Cli, config: &mut WorkerConfig) {
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(metrics_port) = cli.metrics_port {
        config.metrics_port = metrics_port;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = WorkerConfig::load(cli.config.as_deref()).context("load worker config")?;
    apply_overrides(&cli, &mut config);
    config.validate()?;

    init_logging(&config.log_level, config.log_format)?;

    let metrics = Arc::new(OutcomeMetrics::new(METRICS_PREFIX)?);
    let _metrics_task = match config.metrics_addr() {
        Some(addr) => Some(serve_metrics(addr, Arc::clone(&metrics)).await?),
        None => {
            info!("worker metrics endpoint disabled");
            None
        }
    };

    let handler = Arc::new(RequestHandler::new(metrics));
    let state = AppState::new(Arc::clone(&handler));

    let mut shutdown = ShutdownSignal::install().context("install stop signal handlers")?;
    start_server(state, &config.rpc_addr(), async move {
        let signal = shutdown.recv().await;
        info!(
            signal = signal.as_str(),
            "shutdown signal received, draining in-flight requests"
        );
    })
    .await?;

    info!(
        "worker stopped after serving {} requests",
        handler.requests_served()
    );
    Ok(())
}
