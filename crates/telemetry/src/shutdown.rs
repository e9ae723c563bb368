//! Process stop signals shared by both binaries.
//!
//! Orchestrators stop containers with SIGTERM, operators with Ctrl-C; both
//! mean "stop taking new work and finish what is in flight".

use std::io;

use tracing::warn;

/// Which signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl StopSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
        }
    }
}

/// Listener for SIGINT and SIGTERM.
///
/// Handlers are registered by [`install`](Self::install), so a signal that
/// arrives between `install` and [`recv`](Self::recv) is not lost and does
/// not kill the process.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Wait for the first stop signal.
    pub async fn recv(&mut self) -> StopSignal {
        let interrupt = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for SIGINT: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            if self.terminate.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = interrupt => StopSignal::Interrupt,
            _ = terminate => StopSignal::Terminate,
        }
    }
}
