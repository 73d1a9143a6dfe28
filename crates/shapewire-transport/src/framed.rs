use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;

use crate::codec::{decode_text, encode_text, FrameConfig};
use crate::error::FrameError;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads and writes complete text frames over any byte stream.
///
/// Partial reads are buffered internally; callers always get whole messages.
pub struct FramedStream<T> {
    inner: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read + Write> FramedStream<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking, subject to the stream's read timeout).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at EOF.
    pub fn read_text(&mut self) -> Result<String, FrameError> {
        loop {
            if let Some(text) = decode_text(&mut self.read_buf, self.config.max_payload_size)? {
                return Ok(text);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.read_buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Like [`read_text`](Self::read_text), but a read timeout yields `Ok(None)`.
    ///
    /// Bytes of a partially received frame stay buffered for the next call.
    pub fn try_read_text(&mut self) -> Result<Option<String>, FrameError> {
        match self.read_text() {
            Ok(text) => Ok(Some(text)),
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Encode and write one message.
    pub fn write_text(&mut self, text: &str) -> Result<(), FrameError> {
        self.write_buf.clear();
        encode_text(text, self.config.max_payload_size, &mut self.write_buf)?;

        let mut offset = 0usize;
        while offset < self.write_buf.len() {
            match self.inner.write(&self.write_buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
