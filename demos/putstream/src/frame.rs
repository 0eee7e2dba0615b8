//! Demo framing of a content object.
//!
//! ```text
//! +----------+----------+-----------+-------------+---------+
//! | name_len | name     | chunk     | payload_len | payload |
//! | u16 BE   | name_len | u32 BE    | u16 BE      |         |
//! +----------+----------+-----------+-------------+---------+
//! ```
//!
//! Everything up to `payload_len` is the header handed to the face
//! manager; the face manager treats it as opaque bytes.

use thiserror::Error;

/// Framing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Name does not fit the length prefix.
    #[error("name of {0} bytes is too long")]
    NameTooLong(usize),
    /// Payload does not fit the length prefix.
    #[error("payload of {0} bytes is too long")]
    PayloadTooLong(usize),
}

/// Encode the header of one chunk.
pub fn object_header(name: &str, chunk: u32, payload_len: usize) -> Result<Vec<u8>, FrameError> {
    let name_len = u16::try_from(name.len()).map_err(|_| FrameError::NameTooLong(name.len()))?;
    let payload_len =
        u16::try_from(payload_len).map_err(|_| FrameError::PayloadTooLong(payload_len))?;

    let mut header = Vec::with_capacity(2 + name.len() + 4 + 2);
    header.extend_from_slice(&name_len.to_be_bytes());
    header.extend_from_slice(name.as_bytes());
    header.extend_from_slice(&chunk.to_be_bytes());
    header.extend_from_slice(&payload_len.to_be_bytes());
    Ok(header)
}
