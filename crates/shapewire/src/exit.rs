use std::fmt;
use std::io;

use shapewire_channel::{
    ChannelError, RequestError, CHANNEL_CLOSED, INVALID_MESSAGE_STRUCTURE, INVALID_REQUEST,
    LOST_CONNECTION, TIMEOUT as TIMEOUT_CODE,
};
use shapewire_schema::SchemaError;
use shapewire_transport::{FrameError, TransportError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Frame(err) => frame_error(context, err),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::InvalidText => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn schema_error(context: &str, err: SchemaError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Schema(err) => schema_error(context, err),
        ChannelError::Read { source, .. } => io_error(context, source),
        ChannelError::InvalidRoutes(_) | ChannelError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ChannelError::UnknownRoute(_) | ChannelError::DuplicateRoute(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ChannelError::BufferFull(_) | ChannelError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

/// Exit code for a request that completed with an error.
pub fn request_error(err: &RequestError) -> CliError {
    let code = match err.code.as_str() {
        TIMEOUT_CODE => TIMEOUT,
        LOST_CONNECTION | CHANNEL_CLOSED => TRANSPORT_ERROR,
        INVALID_REQUEST | INVALID_MESSAGE_STRUCTURE => DATA_INVALID,
        _ => FAILURE,
    };
    CliError::new(code, err.to_string())
}
