/// Message used when the stream closes without any resolvable answer.
pub const NO_FINAL_RESPONSE: &str = "stream ended without a final response";
/// Message used when the caller aborts a running session.
pub const STREAM_CANCELLED: &str = "stream cancelled";
/// Message used when the endpoint rejects the request with an empty body.
pub const STREAM_OPEN_FAILED: &str = "could not open the stream";
/// Message used when reading or decoding the stream panicked.
pub const STREAM_ABORTED_UNEXPECTEDLY: &str = "stream processing failed unexpectedly";

/// Errors raised by a `Transport` while opening or reading the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Endpoint answered with a non-success HTTP status.
    #[error("stream endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Endpoint answered successfully but exposed no body to read.
    ///
    /// `HttpTransport` always gets a body from `reqwest`; this is for
    /// `Transport` implementations over channels that can come back empty.
    #[error("stream response has no body")]
    MissingBody,
    /// The request could not be sent.
    #[error("stream request failed: {0}")]
    Request(String),
    /// Reading a chunk from an open stream failed.
    #[error("stream read failed: {0}")]
    Read(String),
}

impl TransportError {
    /// Creates a read error from any displayable cause.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read(message.into())
    }

    /// Returns the text placed in the `error` field of the final result.
    ///
    /// Status failures surface the raw response text so backend error pages
    /// reach the user unchanged.
    pub fn final_message(&self) -> String {
        match self {
            Self::Status { body, .. } if !body.trim().is_empty() => body.clone(),
            Self::Status { .. } | Self::MissingBody => STREAM_OPEN_FAILED.to_string(),
            Self::Request(message) | Self::Read(message) => message.clone(),
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// A session task ended without delivering its final snapshot.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
