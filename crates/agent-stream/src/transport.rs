use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};

/// Chunks of the response body, in arrival order.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// JSON body POSTed to the stream endpoint.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
        }
    }
}

/// Source of raw stream bytes for a session.
///
/// Implementations open one response per request; the session reads it one
/// chunk at a time and drops the stream to cancel.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError>;
}

/// `Transport` backed by a `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            request_timeout: config.request_timeout,
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        debug!(endpoint = %self.endpoint, "opening agent stream");
        let mut http_req = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);
        if let Some(timeout) = self.request_timeout {
            http_req = http_req.timeout(timeout);
        }

        let response = http_req.send().await.map_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "stream request failed");
            TransportError::Request(e.to_string())
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.endpoint, %status, "stream endpoint rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(Box::pin(stream))
    }
}
