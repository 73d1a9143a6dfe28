//! Schema-checked request/response channel.
//!
//! A [`Channel`] multiplexes named routes over one reconnecting
//! [`Transport`](shapewire_transport::Transport). Every outgoing request and
//! every incoming response is checked against the route's schemas. Requests
//! made while disconnected are buffered and flushed in order once the
//! connection opens; requests in flight when the connection drops fail with
//! `lostConnection`. Reconnects back off exponentially with jitter.

pub mod channel;
pub mod config;
pub mod connector;
pub mod error;
pub mod route;
pub mod state;
pub mod wire;

pub use channel::{Callback, Channel, SendOutcome};
pub use config::{ChannelConfig, ReconnectPolicy};
#[cfg(unix)]
pub use connector::connect;
pub use error::{
    ChannelError, ProtocolFault, RequestError, Result, BACKEND_ERROR, CHANNEL_CLOSED,
    INVALID_MESSAGE_STRUCTURE, INVALID_REQUEST, LOST_CONNECTION, TIMEOUT,
};
pub use route::{Route, Routes};
pub use state::{ConnectionState, Transition};
pub use wire::{parse_request, parse_response, RequestFrame, Response, ResponseBody, ResponseFrame};
