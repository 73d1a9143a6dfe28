use std::fmt;

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// A connection attempt is in progress. `reconnect` is set when the
    /// attempt was scheduled by the backoff timer rather than by construction.
    Connecting { reconnect: bool },
    /// Requests are transmitted immediately.
    Open,
    /// Explicit shutdown in progress.
    Closing,
}

/// Inputs that move a channel between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Initial connection attempt.
    Dial,
    /// Connection attempt fired by the reconnect timer.
    Redial,
    /// The transport reported `Open`.
    Opened,
    /// Connect failure, transport error/close, or failed send.
    Lost,
    /// Caller asked the channel to shut down.
    Shutdown,
    /// Shutdown finished.
    Closed,
}

impl ConnectionState {
    /// Apply a transition. `None` means the input is not meaningful in the
    /// current state and must be ignored.
    pub fn next(self, transition: Transition) -> Option<ConnectionState> {
        use ConnectionState::*;
        use Transition::*;

        match (self, transition) {
            (Disconnected, Dial) => Some(Connecting { reconnect: false }),
            (Disconnected, Redial) => Some(Connecting { reconnect: true }),
            (Connecting { .. }, Opened) => Some(Open),
            (Connecting { .. } | Open, Lost) => Some(Disconnected),
            (Connecting { .. } | Open, Shutdown) => Some(Closing),
            (Disconnected, Shutdown) => Some(Closing),
            (Closing, Lost | Closed) => Some(Disconnected),
            _ => None,
        }
    }

    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting { reconnect: false } => "connecting",
            ConnectionState::Connecting { reconnect: true } => "reconnecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
