use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The peer stopped answering; every in-flight request is failed with this.
pub const LOST_CONNECTION: &str = "lostConnection";
/// A response did not match the route's response schema.
pub const INVALID_MESSAGE_STRUCTURE: &str = "invalidMessageStructure";
/// A request did not match the route's request schema and was not sent.
pub const INVALID_REQUEST: &str = "invalidRequest";
/// No response arrived before the request deadline.
pub const TIMEOUT: &str = "timeout";
/// The channel was shut down before the request could be sent.
pub const CHANNEL_CLOSED: &str = "channelClosed";
/// The backend answered with an error object lacking `code`/`message`.
pub const BACKEND_ERROR: &str = "backendError";

/// Errors returned by channel operations.
///
/// Failures of an individual request are never reported here; they go to the
/// request's callback as a [`RequestError`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A route with this name is already registered.
    #[error("route {0} is already registered")]
    DuplicateRoute(String),

    /// No route with this name is registered.
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    /// The outbound buffer already holds the configured maximum.
    #[error("request buffer full ({0} requests)")]
    BufferFull(usize),

    /// The channel was closed with [`crate::Channel::close`].
    #[error("channel is closed")]
    Closed,

    /// A routes document could not be understood.
    #[error("invalid routes definition: {0}")]
    InvalidRoutes(String),

    /// A routes file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Schema configuration error (unresolved reference, unknown type).
    #[error("schema error: {0}")]
    Schema(#[from] shapewire_schema::SchemaError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] shapewire_transport::TransportError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structured failure handed to a request callback.
///
/// Also the shape of the `error` object on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RequestError {
    pub code: String,
    pub message: String,
}

impl RequestError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn lost_connection() -> Self {
        Self::new(LOST_CONNECTION, "we lost connection with the server")
    }

    pub fn invalid_message_structure(reason: impl Into<String>) -> Self {
        Self::new(INVALID_MESSAGE_STRUCTURE, reason)
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, reason)
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(TIMEOUT, format!("no response after {after:?}"))
    }

    pub fn channel_closed() -> Self {
        Self::new(CHANNEL_CLOSED, "channel closed before the request was sent")
    }

    /// Whether this error carries `code`.
    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFault {
    #[error("frame is not valid JSON: {0}")]
    NotJson(String),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("missing or non-integer order")]
    MissingOrder,

    #[error("missing or non-string sessionid")]
    MissingSession,

    #[error("missing routename")]
    MissingRoute,

    #[error("frame must carry exactly one of message or error")]
    AmbiguousBody,

    #[error("{0} must be an object")]
    BodyNotObject(&'static str),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
