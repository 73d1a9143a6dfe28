use bytes::{Buf, BufMut, BytesMut};

use crate::error::FrameError;

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "SW" (0x53 0x57).
pub const MAGIC: [u8; 2] = [0x53, 0x57];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration for framed streams.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: Some(std::time::Duration::from_secs(5)),
        }
    }
}

/// Encode one text message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────┐
/// │ Magic (2B)   │ Length    │ UTF-8 payload    │
/// │ 0x53 0x57    │ (4B LE)   │ (Length bytes)   │
/// │ "SW"         │           │                  │
/// └──────────────┴───────────┴──────────────────┘
/// ```
pub fn encode_text(text: &str, max_payload: usize, dst: &mut BytesMut) -> Result<(), FrameError> {
    let max = max_payload.min(u32::MAX as usize);
    if text.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: text.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + text.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(text.len() as u32);
    dst.put_slice(text.as_bytes());
    Ok(())
}

/// Decode one text message from a buffer.
///
/// Returns `Ok(None)` until the buffer holds a complete frame, then consumes it.
pub fn decode_text(src: &mut BytesMut, max_payload: usize) -> Result<Option<String>, FrameError> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut length = [0u8; 4];
    length.copy_from_slice(&src[2..HEADER_SIZE]);
    let payload_len = u32::from_le_bytes(length) as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len);
    String::from_utf8(payload.to_vec())
        .map(Some)
        .map_err(|_| FrameError::InvalidText)
}
