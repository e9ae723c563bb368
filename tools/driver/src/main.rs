use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use spinload_driver::analyze;
use spinload_driver::report::{render_summary, write_json};
use spinload_driver::{
    DriverConfig, DriverError, HttpWorkClient, OutcomeRecorder, RunController, RunDuration,
    METRICS_PREFIX,
};
use spinload_telemetry::{
    init_logging, serve_metrics, LogFormat, OutcomeMetrics, ShutdownSignal,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "spinload-driver",
    author,
    version,
    about = "Open-loop load generator for the spinload worker",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Flags for `run`, accepted without the subcommand as well
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive load against a worker and record every attempt
    Run(RunArgs),
    /// Summarise recorded CSV files
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Optional TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Worker address (`host:port` or URL)
    #[arg(long)]
    target: Option<String>,

    /// Requests per second
    #[arg(long)]
    rps: Option<u64>,

    /// Busy-spin per call in milliseconds
    #[arg(long)]
    spin_ms: Option<u64>,

    /// Total run duration, e.g. `30s`, `12m` or `unbounded`
    #[arg(long, value_parser = parse_run_duration)]
    duration: Option<RunDuration>,

    /// CSV output path
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Load driver Prometheus metrics port (0 disables)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Per-call deadline
    #[arg(long, value_parser = humantime::parse_duration)]
    call_timeout: Option<Duration>,

    /// Cap on concurrent calls; attempts over the cap fail immediately
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Write the run summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Skip the startup reachability check
    #[arg(long)]
    no_probe: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_name = "pretty|json")]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Attempt record files produced by `run`
    #[arg(required = true, value_name = "CSV")]
    files: Vec<PathBuf>,

    /// Discard rows this long after each file's first timestamp
    #[arg(long, value_parser = humantime::parse_duration, default_value = "2m")]
    warmup: Duration,

    /// Also write the table as JSON
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,
}

fn parse_run_duration(value: &str) -> std::result::Result<RunDuration, String> {
    value.parse().map_err(|err: DriverError| err.to_string())
}

impl RunArgs {
    fn apply_overrides(&self, config: &mut DriverConfig) {
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(rps) = self.rps {
            config.rps = rps;
        }
        if let Some(spin_ms) = self.spin_ms {
            config.spin_ms = spin_ms;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(out) = &self.out {
            config.out = out.clone();
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(timeout) = self.call_timeout {
            config.call_timeout = timeout;
        }
        if self.max_in_flight.is_some() {
            config.max_in_flight = self.max_in_flight;
        }
        if self.report.is_some() {
            config.report = self.report.clone();
        }
        if self.no_probe {
            config.probe = false;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Run(args)) => run(args).await,
        Some(Command::Analyze(args)) => run_analysis(args).await,
        None => run(cli.run).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = DriverConfig::load(args.config.as_deref()).context("load driver config")?;
    args.apply_overrides(&mut config);
    config.validate()?;

    init_logging(&config.log_level, config.log_format)?;
    info!(
        worker = %config.target,
        rps = config.rps,
        spin_ms = config.spin_ms,
        duration = %config.duration,
        out = %config.out.display(),
        pid = std::process::id(),
        "starting load driver"
    );
    if let Some(cap) = config.max_in_flight {
        warn!(cap, "in-flight cap set; attempts beyond it are shed and load is no longer open-loop");
    }

    let metrics = Arc::new(OutcomeMetrics::new(METRICS_PREFIX)?);
    let _metrics_task = match config.metrics_addr() {
        Some(addr) => Some(serve_metrics(addr, Arc::clone(&metrics)).await?),
        None => {
            info!("load driver metrics endpoint disabled");
            None
        }
    };

    let recorder = Arc::new(
        OutcomeRecorder::create(&config.out, metrics)
            .with_context(|| format!("create record file {}", config.out.display()))?,
    );
    let client = Arc::new(HttpWorkClient::new(&config.target).map_err(DriverError::Client)?);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut shutdown = ShutdownSignal::install().context("install stop signal handlers")?;
    tokio::spawn(async move {
        let signal = shutdown.recv().await;
        info!(
            signal = signal.as_str(),
            "stop requested, no new attempts will be dispatched"
        );
        let _ = stop_tx.send(true);
    });

    let mut controller = RunController::new(config.clone(), client, Arc::clone(&recorder));
    let summary = controller.run(stop_rx).await?;

    print!("{}", render_summary(&summary, recorder.path()));
    if let Some(path) = &config.report {
        write_json(path, &summary)
            .await
            .with_context(|| format!("write report {}", path.display()))?;
        println!("  report: {}", path.display());
    }
    Ok(())
}

async fn run_analysis(args: AnalyzeArgs) -> Result<()> {
    init_logging("warn", LogFormat::Pretty)?;

    let groups = analyze::analyze_files(&args.files, args.warmup)?;
    if groups.is_empty() {
        println!("no rows left after discarding {:?} of warm-up", args.warmup);
    } else {
        print!("{}", analyze::render_table(&groups));
    }

    if let Some(path) = &args.json {
        write_json(path, &groups)
            .await
            .with_context(|| format!("write analysis {}", path.display()))?;
    }
    Ok(())
}
