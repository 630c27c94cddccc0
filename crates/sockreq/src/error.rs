//! Error types for the virtual-request client.

use thiserror::Error;

/// Errors reported by connections, queues, and registries.
///
/// Application-level failures (a `404` or `500` reply) are *not* errors: they
/// arrive as a normal [`ResponseEnvelope`](crate::ResponseEnvelope) whose
/// [`is_error`](crate::ResponseEnvelope::is_error) returns `true`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    /// `connect()` or `reconnect()` while a connection attempt is in progress.
    #[error("Cannot connect: socket is already connecting")]
    AlreadyConnecting,
    /// `connect()` or `reconnect()` while the socket is connected.
    #[error("Cannot connect: socket is already connected")]
    AlreadyConnected,
    /// `disconnect()` while the socket is not connected.
    #[error("Cannot disconnect: socket is already disconnected")]
    AlreadyDisconnected,
    /// An argument was rejected, e.g. an empty tag for queue removal.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Configuration cannot change in the current connection state.
    #[error("{0}")]
    StateConflict(String),
    /// Required configuration was never provided.
    #[error("{0}")]
    MissingConfiguration(String),
    /// The connection URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// An acknowledgment lacked a well-formed `statusCode`, `headers`, or `body`.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// The transport refused to send a message.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The completion was discarded before a reply arrived.
    #[error("Request was cancelled before a response arrived")]
    Cancelled,
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<url::ParseError> for SocketError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for SocketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// A specialized Result type for virtual-request operations.
pub type Result<T> = std::result::Result<T, SocketError>;
