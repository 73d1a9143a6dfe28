use std::time::Duration;

use crate::error::Result;

/// Notification delivered by a transport.
///
/// Events are consumed one at a time by a single owner; a transport never
/// delivers two events concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection attempt succeeded.
    Open,
    /// One complete text message arrived.
    Message(String),
    /// The connection failed. Usually followed by `Close`.
    Error(String),
    /// The connection is gone.
    Close,
}

/// A duplex, message-oriented connection that can be re-established.
pub trait Transport {
    /// Start a connection attempt.
    ///
    /// Success is reported later as [`TransportEvent::Open`]; an `Err` here
    /// means the attempt failed immediately. Undelivered events of a previous
    /// connection are discarded.
    fn connect(&mut self) -> Result<()>;

    /// Send one text message on the open connection.
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Close the connection. Pending events may still be delivered.
    fn close(&mut self);

    /// Wait up to `timeout` for the next event.
    fn poll_event(&mut self, timeout: Duration) -> Option<TransportEvent>;

    /// Short transport name for diagnostics.
    fn name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        (**self).send_text(text)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn poll_event(&mut self, timeout: Duration) -> Option<TransportEvent> {
        (**self).poll_event(timeout)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
