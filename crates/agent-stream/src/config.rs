use std::time::Duration;

use crate::errors::ClientError;

/// Stream endpoint used when `AGENT_STREAM_URL` is not set.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/api/chat/stream";
/// User id sent when none is configured.
pub const DEFAULT_USER_ID: &str = "anonymous";

/// Configuration for the stream client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// URL the chat request is POSTed to.
    pub endpoint: String,
    /// Value of `user_id` in every request body.
    pub user_id: String,
    /// Limit for establishing the connection.
    pub connect_timeout: Duration,
    /// Optional limit for the whole request, stream included.
    ///
    /// Unset by default since pipeline runs can stream for minutes.
    pub request_timeout: Option<Duration>,
    /// Bounded update buffer between a session task and its consumer.
    pub update_buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl ClientConfig {
    /// Creates a config for `endpoint` with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_id: DEFAULT_USER_ID.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            update_buffer_capacity: 128,
        }
    }

    /// Builds a config from the environment.
    ///
    /// Reads `AGENT_STREAM_URL`, `AGENT_STREAM_USER_ID` and
    /// `AGENT_STREAM_TIMEOUT_SECS`; unset or blank values keep the defaults.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, which plays the role of the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let endpoint =
            non_empty("AGENT_STREAM_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let mut config = Self::new(endpoint);
        if let Some(user_id) = non_empty("AGENT_STREAM_USER_ID") {
            config.user_id = user_id;
        }
        if let Some(raw) = non_empty("AGENT_STREAM_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                ClientError::Config(format!(
                    "AGENT_STREAM_TIMEOUT_SECS must be whole seconds, got {raw:?}"
                ))
            })?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the user id.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets a whole-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the bounded update buffer size.
    pub fn update_buffer_capacity(mut self, capacity: usize) -> Self {
        self.update_buffer_capacity = capacity;
        self
    }

    /// Rejects configurations a session cannot run with.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(ClientError::Config("user_id must not be empty".into()));
        }
        if self.update_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "update_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
