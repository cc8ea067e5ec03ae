//! Binary serialization helpers built on postcard.
//!
//! Used for on-disk snapshots of envelope records. Snapshots are written
//! with a magic header and a 4-byte little-endian length prefix so a
//! truncated file is detected instead of silently decoding a partial value.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Header written before every framed snapshot.
pub const MAGIC: &[u8; 4] = b"NCH1";

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame is incomplete or has an invalid header.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes a value into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a value from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a value as `[MAGIC][u32 length (LE)][payload]`.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the value cannot be serialized,
/// or `CodecError::InvalidFrame` if the payload exceeds `u32::MAX` bytes.
pub fn encode_framed<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let payload = encode(value)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        CodecError::InvalidFrame(format!(
            "payload too large for framing: {} bytes",
            payload.len()
        ))
    })?;
    let mut frame = Vec::with_capacity(MAGIC.len() + 4 + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes a frame written by [`encode_framed`].
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` if the header is wrong or the frame is
/// shorter than its length prefix claims, or `CodecError::Serialization` if
/// the payload cannot be deserialized.
pub fn decode_framed<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let header_len = MAGIC.len() + 4;
    if bytes.len() < header_len {
        return Err(CodecError::InvalidFrame(format!(
            "need at least {header_len} header bytes, got {}",
            bytes.len()
        )));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(CodecError::InvalidFrame("bad magic".into()));
    }
    let len_bytes: [u8; 4] = bytes[MAGIC.len()..header_len]
        .try_into()
        .map_err(|_| CodecError::InvalidFrame("failed to read length prefix".into()))?;
    let payload_len = u32::from_le_bytes(len_bytes) as usize;

    let total_len = header_len + payload_len;
    if bytes.len() < total_len {
        return Err(CodecError::InvalidFrame(format!(
            "frame indicates {} bytes but only {} available",
            payload_len,
            bytes.len() - header_len
        )));
    }

    decode(&bytes[header_len..total_len])
}
