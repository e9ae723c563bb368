//! Scripted `WorkClient` stand-ins for unit tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use spinload_telemetry::OutcomeMetrics;
use spinload_types::{Attempt, WorkRequest, WorkResponse};

use crate::errors::CallError;
use crate::recorder::OutcomeRecorder;
use crate::transport::WorkClient;

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Sleep for the requested spin, then answer.
    Sleep,
    /// Sleep for a fixed time regardless of the request, then answer.
    SleepFor(Duration),
    /// Fail immediately with HTTP 503.
    Unavailable,
    Panic,
}

pub struct StubClient {
    behaviour: Behaviour,
    reachable: bool,
    calls: AtomicU64,
}

impl StubClient {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            reachable: true,
            calls: AtomicU64::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            behaviour: Behaviour::Unavailable,
            reachable: false,
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkClient for StubClient {
    async fn invoke(&self, request: WorkRequest) -> Result<WorkResponse, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Sleep => {
                tokio::time::sleep(Duration::from_millis(request.duration_ms)).await;
                Ok(WorkResponse::processed(request.duration_ms))
            }
            Behaviour::SleepFor(pause) => {
                tokio::time::sleep(pause).await;
                Ok(WorkResponse::processed(request.duration_ms))
            }
            Behaviour::Unavailable => Err(CallError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Behaviour::Panic => panic!("stub client exploded"),
        }
    }

    async fn probe(&self) -> Result<(), CallError> {
        if self.reachable {
            Ok(())
        } else {
            Err(CallError::Connect("connection refused".to_string()))
        }
    }

    fn endpoint(&self) -> &str {
        "stub://worker"
    }
}

pub fn recorder_in(dir: &tempfile::TempDir) -> Arc<OutcomeRecorder> {
    let metrics = Arc::new(OutcomeMetrics::new("load_driver").unwrap());
    Arc::new(OutcomeRecorder::create(&dir.path().join("results.csv"), metrics).unwrap())
}

pub fn read_records(recorder: &OutcomeRecorder) -> Vec<Attempt> {
    recorder.flush().unwrap();
    let path = recorder.path().unwrap();
    csv::Reader::from_path(path)
        .unwrap()
        .deserialize()
        .collect::<Result<Vec<Attempt>, _>>()
        .unwrap()
}
