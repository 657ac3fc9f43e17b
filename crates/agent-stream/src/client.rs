use std::sync::Arc;

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::session::SessionStream;
use crate::state::SessionSnapshot;
use crate::transport::{ChatRequest, HttpTransport, Transport};

/// Entry point for sending messages to the agent pipeline.
///
/// Each call to `start` or `ask` runs an independent session with its own
/// state; a client can serve many sessions concurrently.
#[derive(Clone)]
pub struct StreamClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl StreamClient {
    /// Creates a client that talks HTTP to `config.endpoint`.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client from `AGENT_STREAM_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Creates a client over a caller-provided transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends `message` and starts a streaming session.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self, message: impl Into<String>) -> SessionStream {
        let request = ChatRequest::new(message, self.config.user_id.clone());
        SessionStream::spawn(
            self.transport.clone(),
            request,
            self.config.update_buffer_capacity,
        )
    }

    /// Sends `message` and waits for the final snapshot.
    pub async fn ask(&self, message: impl Into<String>) -> Result<SessionSnapshot, ClientError> {
        self.start(message).await.finish().await
    }
}
