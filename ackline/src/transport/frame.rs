//! Byte framing for stream transports.
//!
//! Frame format: `[length:4][checksum:4][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of the payload
//! - **payload**: One encoded wire message
//!
//! This envelope belongs to [`TcpConnector`](super::TcpConnector) only. The
//! session protocol itself defines no byte framing, so both ends of a TCP
//! connection must speak this envelope; a stock service listening on the
//! default port will not.

/// Header size: 4 (length) + 4 (checksum) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (1MB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Framing errors. All of them are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from header.
        expected: u32,
        /// Computed checksum from data.
        actual: u32,
    },

    /// Payload exceeds maximum allowed size.
    #[error("frame too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    FrameTooLarge {
        /// Payload size in bytes.
        size: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },
}

/// Frame header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame size including header.
    pub length: u32,
    /// CRC32C checksum of the payload.
    pub checksum: u32,
}

impl FrameHeader {
    fn serialize_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
    }

    fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            checksum: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// Wrap one encoded message in a frame.
///
/// # Errors
///
/// Returns `FrameTooLarge` if payload exceeds [`MAX_PAYLOAD_SIZE`].
///
/// # Examples
///
/// ```
/// use ackline::transport::{serialize_frame, try_deserialize_frame};
///
/// let frame = serialize_frame(br#"{"ack":1}"#).expect("serialize");
/// let (payload, consumed) = try_deserialize_frame(&frame)
///     .expect("valid")
///     .expect("complete");
/// assert_eq!(payload, br#"{"ack":1}"#);
/// assert_eq!(consumed, frame.len());
/// ```
pub fn serialize_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
        });
    }

    let total_length = HEADER_SIZE + payload.len();
    let mut data = vec![0u8; total_length];

    let header = FrameHeader {
        length: total_length as u32,
        checksum: crc32c::crc32c(payload),
    };
    header.serialize_into(&mut data[..HEADER_SIZE]);
    data[HEADER_SIZE..].copy_from_slice(payload);

    Ok(data)
}

/// Try to take one frame off the front of a stream buffer.
///
/// # Returns
///
/// - `Ok(Some((payload, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more data is needed
/// - `Err` if the data is malformed
pub fn try_deserialize_frame(data: &[u8]) -> Result<Option<(Vec<u8>, usize)>, FrameError> {
    let Some(header) = FrameHeader::parse(data) else {
        return Ok(None);
    };

    if header.length < HEADER_SIZE as u32 {
        return Err(FrameError::InvalidLength {
            length: header.length,
        });
    }
    let expected_len = header.length as usize;
    if expected_len - HEADER_SIZE > MAX_PAYLOAD_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: expected_len - HEADER_SIZE,
        });
    }
    if data.len() < expected_len {
        return Ok(None);
    }

    let payload = &data[HEADER_SIZE..expected_len];
    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(FrameError::ChecksumMismatch {
            expected: header.checksum,
            actual: computed,
        });
    }

    Ok(Some((payload.to_vec(), expected_len)))
}
