use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use spinload_telemetry::LogFormat;

use crate::errors::{Result, WorkerError};

pub const ENV_PREFIX: &str = "SPINLOAD_WORKER";

/// Worker settings, layered: defaults, optional file, `SPINLOAD_WORKER_*`,
/// then command-line overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub host: String,
    /// RPC port.
    pub port: u16,
    /// Metrics port, served independently of the RPC port. 0 disables it.
    pub metrics_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
            metrics_port: 2112,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl WorkerConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(WorkerError::ConfigNotFound(PathBuf::from(path)));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: WorkerConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(WorkerError::InvalidConfig("host must not be empty".into()));
        }
        if self.metrics_port != 0 && self.metrics_port == self.port {
            return Err(WorkerError::InvalidConfig(format!(
                "metrics port {} must differ from the RPC port",
                self.metrics_port
            )));
        }
        Ok(())
    }

    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        if self.metrics_port == 0 {
            return None;
        }
        let host: IpAddr = self
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Some(SocketAddr::new(host, self.metrics_port))
    }
}
