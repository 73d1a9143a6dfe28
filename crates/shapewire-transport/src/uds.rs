use std::collections::VecDeque;
use std::net::Shutdown;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result, TransportError};
use crate::framed::FramedStream;
use crate::traits::{Transport, TransportEvent};

/// Default permission mode for created socket paths.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
pub const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
pub const MAX_PATH_LEN: usize = 104;

const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Listening side of a filesystem-path Unix domain socket.
///
/// Accepted connections are returned as framed streams. The socket file is
/// removed on drop, unless something else has replaced it in the meantime.
pub struct UdsListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
    frame_config: FrameConfig,
}

impl UdsListener {
    /// Bind and listen on `path` with [`DEFAULT_SOCKET_MODE`].
    ///
    /// An existing socket file at `path` is treated as stale and removed;
    /// any other kind of file is left alone and binding fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, DEFAULT_SOCKET_MODE)
    }

    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            created_inode: (created.dev(), created.ino()),
            path,
            frame_config: FrameConfig::default(),
        })
    }

    /// Frame settings applied to accepted connections.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// In non-blocking mode `accept` fails with `WouldBlock` instead of waiting.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Accept an incoming connection.
    ///
    /// Accepted streams are always blocking, subject to the frame config timeouts.
    pub fn accept(&self) -> Result<FramedStream<UnixStream>> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(self.frame_config.read_timeout)?;
        stream.set_write_timeout(self.frame_config.write_timeout)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(FramedStream::with_config(stream, self.frame_config.clone()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

/// Client [`Transport`] over a Unix domain socket.
///
/// `connect` is synchronous: on success an `Open` event is queued for the next
/// poll. End of stream is reported as `Close`; read failures as `Error`
/// followed by `Close`.
pub struct UdsTransport {
    path: PathBuf,
    frame_config: FrameConfig,
    stream: Option<FramedStream<UnixStream>>,
    events: VecDeque<TransportEvent>,
}

impl UdsTransport {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, FrameConfig::default())
    }

    pub fn with_config(path: impl AsRef<Path>, frame_config: FrameConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frame_config,
            stream: None,
            events: VecDeque::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn drop_stream(&mut self) {
        if let Some(framed) = self.stream.take() {
            let _ = framed.get_ref().shutdown(Shutdown::Both);
        }
    }
}

impl Transport for UdsTransport {
    fn connect(&mut self) -> Result<()> {
        check_path_len(&self.path)?;
        self.drop_stream();
        self.events.clear();

        let stream = UnixStream::connect(&self.path).map_err(|source| TransportError::Connect {
            path: self.path.clone(),
            source,
        })?;
        stream.set_write_timeout(self.frame_config.write_timeout)?;

        debug!(path = ?self.path, "connected to unix domain socket");
        self.stream = Some(FramedStream::with_config(stream, self.frame_config.clone()));
        self.events.push_back(TransportEvent::Open);
        Ok(())
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        let framed = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        framed.write_text(text)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.is_some() {
            self.drop_stream();
            self.events.push_back(TransportEvent::Close);
        }
    }

    fn poll_event(&mut self, timeout: Duration) -> Option<TransportEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }

        let Some(framed) = self.stream.as_mut() else {
            std::thread::sleep(timeout);
            return None;
        };

        let wait = self
            .frame_config
            .read_timeout
            .map_or(timeout, |cap| cap.min(timeout))
            .max(MIN_READ_TIMEOUT);
        if let Err(err) = framed.get_ref().set_read_timeout(Some(wait)) {
            warn!(error = %err, "failed to set read timeout");
        }

        match framed.try_read_text() {
            Ok(Some(text)) => Some(TransportEvent::Message(text)),
            Ok(None) => None,
            Err(FrameError::ConnectionClosed) => {
                debug!(path = ?self.path, "peer closed connection");
                self.drop_stream();
                Some(TransportEvent::Close)
            }
            Err(err) => {
                warn!(path = ?self.path, error = %err, "read failed");
                self.drop_stream();
                self.events.push_back(TransportEvent::Close);
                Some(TransportEvent::Error(err.to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

impl Drop for UdsTransport {
    fn drop(&mut self) {
        self.drop_stream();
    }
}
