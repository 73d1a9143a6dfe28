//! Duplex text-message transports.
//!
//! A [`Transport`] connects, sends whole text messages and reports what
//! happened through [`TransportEvent`]s that its single owner polls for.
//! Two implementations are provided:
//! - [`UdsTransport`]: Unix domain socket client speaking "SW" text frames
//! - [`ScriptedTransport`]: in-memory, driven by a [`ScriptHandle`]
//!
//! [`UdsListener`] and [`FramedStream`] cover the serving side.

pub mod codec;
pub mod error;
pub mod framed;
pub mod scripted;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use codec::FrameConfig;
pub use error::{FrameError, Result, TransportError};
pub use framed::FramedStream;
pub use scripted::{ScriptHandle, ScriptedTransport};
pub use traits::{Transport, TransportEvent};

#[cfg(unix)]
pub use uds::{UdsListener, UdsTransport};
