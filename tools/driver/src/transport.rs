use std::time::Duration;

use async_trait::async_trait;
use spinload_types::{WorkRequest, WorkResponse};

use crate::config::base_url;
use crate::errors::CallError;

/// Client side of the `InvokeWork` contract.
#[async_trait]
pub trait WorkClient: Send + Sync {
    async fn invoke(&self, request: WorkRequest) -> Result<WorkResponse, CallError>;

    /// Cheap reachability check run once before dispatching.
    async fn probe(&self) -> Result<(), CallError>;

    /// Human readable endpoint, for logs.
    fn endpoint(&self) -> &str;
}

/// JSON-over-HTTP client for the worker's `POST /invoke` route.
///
/// Carries no overall request timeout: the dispatcher owns each attempt's
/// deadline.
#[derive(Clone)]
pub struct HttpWorkClient {
    client: reqwest::Client,
    base_url: String,
    invoke_url: String,
    probe_timeout: Duration,
}

impl HttpWorkClient {
    pub fn new(target: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(256)
            .build()?;
        Ok(Self::with_client(client, target))
    }

    pub fn with_client(client: reqwest::Client, target: &str) -> Self {
        let base_url = base_url(target);
        Self {
            client,
            invoke_url: format!("{base_url}/invoke"),
            base_url,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

fn classify(err: reqwest::Error) -> CallError {
    if err.is_connect() {
        CallError::Connect(err.to_string())
    } else if err.is_decode() {
        CallError::Decode(err.to_string())
    } else {
        CallError::Transport(err.to_string())
    }
}

#[async_trait]
impl WorkClient for HttpWorkClient {
    async fn invoke(&self, request: WorkRequest) -> Result<WorkResponse, CallError> {
        let response = self
            .client
            .post(&self.invoke_url)
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<WorkResponse>()
            .await
            .map_err(|err| CallError::Decode(err.to_string()))
    }

    async fn probe(&self) -> Result<(), CallError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    CallError::Timeout(self.probe_timeout)
                } else {
                    classify(err)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(CallError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
