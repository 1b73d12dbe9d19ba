//! HTTP client for the start/continue endpoints
//!
//! Returns lazily decoded [`EventStream`]s. A "session not ready" rejection is
//! retried once after a short delay before it is reported.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::controller::{ContinueRequest, StartRequest};
use crate::events::{EventStream, RelayError};

const START_PATH: &str = "/api/plans/start";
const CONTINUE_PATH: &str = "/api/plans/continue";

pub struct RelayClient {
    http: Client,
    base_url: String,
    not_ready_retry_delay: Duration,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, not_ready_retry_delay: Duration) -> Self {
        Self::with_http(Client::new(), base_url, not_ready_retry_delay)
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .unwrap_or_default();
        Self::with_http(http, config.base_url.clone(), config.not_ready_retry_delay())
    }

    fn with_http(http: Client, base_url: impl Into<String>, not_ready_retry_delay: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            not_ready_retry_delay,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn start(&self, request: &StartRequest) -> Result<EventStream, RelayError> {
        self.open_with_retry(START_PATH, request).await
    }

    pub async fn resume(&self, request: &ContinueRequest) -> Result<EventStream, RelayError> {
        self.open_with_retry(CONTINUE_PATH, request).await
    }

    async fn open_with_retry<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<EventStream, RelayError> {
        match self.open(path, body).await {
            Err(err) if err.is_not_ready() => {
                info!(
                    "Session not ready, retrying in {:?}",
                    self.not_ready_retry_delay
                );
                tokio::time::sleep(self.not_ready_retry_delay).await;
                self.open(path, body).await
            }
            other => other,
        }
    }

    async fn open<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<EventStream, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("accept", "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = RelayError::from_response(status.as_u16(), &text);
            warn!("Relay rejected {}: {}", path, err);
            return Err(err);
        }

        let body = response.bytes_stream().map(|r| r.map_err(map_transport));
        Ok(EventStream::new(body))
    }
}

fn map_transport(err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::timeout(format!("request timed out: {}", err))
    } else {
        RelayError::unknown(format!("transport error: {}", err))
    }
}
