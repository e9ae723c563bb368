use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File as ConfigFile};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use spinload_telemetry::LogFormat;

use crate::errors::{DriverError, Result};

pub const ENV_PREFIX: &str = "SPINLOAD_DRIVER";

/// How long the pacer keeps emitting ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDuration {
    Bounded(Duration),
    /// Until the process is stopped.
    Unbounded,
}

impl RunDuration {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            RunDuration::Bounded(d) => Some(*d),
            RunDuration::Unbounded => None,
        }
    }
}

impl FromStr for RunDuration {
    type Err = DriverError;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "unbounded" | "forever" | "inf" => Ok(RunDuration::Unbounded),
            _ => humantime::parse_duration(trimmed)
                .map(RunDuration::Bounded)
                .map_err(|_| DriverError::InvalidDuration(value.to_string())),
        }
    }
}

impl fmt::Display for RunDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunDuration::Bounded(d) => write!(f, "{}", humantime::format_duration(*d)),
            RunDuration::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for RunDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RunDurationVisitor;

        impl<'de> Visitor<'de> for RunDurationVisitor {
            type Value = RunDuration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration such as \"12m\", a number of seconds, or \"unbounded\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<RunDuration, E> {
                value.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, secs: u64) -> std::result::Result<RunDuration, E> {
                Ok(RunDuration::Bounded(Duration::from_secs(secs)))
            }

            fn visit_i64<E: de::Error>(self, secs: i64) -> std::result::Result<RunDuration, E> {
                u64::try_from(secs)
                    .map(|secs| RunDuration::Bounded(Duration::from_secs(secs)))
                    .map_err(|_| E::custom(format!("negative run duration: {secs}")))
            }
        }

        deserializer.deserialize_any(RunDurationVisitor)
    }
}

/// Load driver settings, layered: defaults, optional file,
/// `SPINLOAD_DRIVER_*`, then command-line overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// `host:port` or URL of the worker.
    pub target: String,
    pub rps: u64,
    pub spin_ms: u64,
    pub duration: RunDuration,
    /// Durable per-attempt record, created fresh for each run.
    pub out: PathBuf,
    /// Driver metrics port, independent of the worker's. 0 disables it.
    pub metrics_port: u16,
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Optional in-flight ceiling. Unset keeps the load strictly open-loop.
    pub max_in_flight: Option<usize>,
    /// Optional JSON summary written at the end of the run.
    pub report: Option<PathBuf>,
    /// Check `/health` on the target before dispatching.
    pub probe: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target: "worker.default.svc.cluster.local:50051".to_string(),
            rps: 5,
            spin_ms: 100,
            duration: RunDuration::Bounded(Duration::from_secs(12 * 60)),
            out: PathBuf::from("/out/results.csv"),
            metrics_port: 2113,
            call_timeout: Duration::from_secs(30),
            max_in_flight: None,
            report: None,
            probe: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl DriverConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(DriverError::ConfigNotFound(PathBuf::from(path)));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: DriverConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rps == 0 {
            return Err(DriverError::InvalidRate(self.rps));
        }
        if self.call_timeout.is_zero() {
            return Err(DriverError::InvalidTimeout);
        }
        if self.max_in_flight == Some(0) {
            return Err(DriverError::InvalidInFlightCap);
        }
        Ok(())
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        if self.metrics_port == 0 {
            return None;
        }
        Some(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.metrics_port,
        ))
    }
}

/// Normalise a target into a base URL: `host:port` gets `http://`.
pub fn base_url(target: &str) -> String {
    let trimmed = target.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
