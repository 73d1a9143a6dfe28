use std::path::PathBuf;

/// Failures of a [`crate::Transport`] or [`crate::UdsListener`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The peer is not listening, or the socket path is unusable.
    #[error("cannot reach {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `sun_path` cannot hold the socket path.
    #[error("socket path is {len} bytes, the platform allows {max}: {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// An operation needed an open connection and there was none.
    #[error("transport is not connected")]
    NotConnected,

    /// The transport refused the operation (scripted failures, shutdown).
    #[error("transport rejected operation: {0}")]
    Rejected(String),
}

/// Failures of the text-frame codec and [`crate::FramedStream`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame magic (expected 0x5357 \"SW\")")]
    InvalidMagic,

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame payload is not UTF-8 text")]
    InvalidText,

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// EOF, possibly in the middle of a frame.
    #[error("connection closed by peer")]
    ConnectionClosed,
}

impl TransportError {
    /// Whether a non-blocking operation had nothing to do.
    pub fn is_would_block(&self) -> bool {
        match self {
            Self::Accept(err) | Self::Io(err) => err.kind() == std::io::ErrorKind::WouldBlock,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
