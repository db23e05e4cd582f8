//! Message framing and payload encodings.
//!
//! Every endpoint frames messages with a 4-byte length prefix (LengthDelimitedCodec),
//! which gives stream sockets message-queue boundaries. On top of that:
//! - `main` carries one little-endian i64 per message
//! - `setup` carries address records: a little-endian i32 length message, then a
//!   message holding exactly that many bytes of NUL-terminated text

use tokio_util::bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::LengthDelimitedCodec;

/// Size of one request identifier or ack on the wire.
pub const WORD_LEN: usize = 8;

/// Size of the length field that precedes an address string on `setup`.
pub const ADDRESS_LENGTH_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("expected {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },

    #[error("invalid address length {0}")]
    InvalidLength(i32),

    #[error("address text is not NUL-terminated")]
    MissingTerminator,

    #[error("address text contains an interior NUL")]
    InteriorNul,

    #[error("address text is not valid UTF-8")]
    NotUtf8,
}

/// Framing codec shared by all endpoints.
pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(max_frame_length)
        .new_codec()
}

pub fn encode_word(value: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(WORD_LEN);
    buf.put_i64_le(value);
    buf.freeze()
}

pub fn decode_word(frame: &[u8]) -> Result<i64, FrameError> {
    let bytes: [u8; WORD_LEN] = frame.try_into().map_err(|_| FrameError::Size {
        expected: WORD_LEN,
        actual: frame.len(),
    })?;
    Ok(i64::from_le_bytes(bytes))
}

/// Address record as two messages: the length (terminator included) and the text.
pub fn encode_address(address: &str) -> Result<(Bytes, Bytes), FrameError> {
    if address.as_bytes().contains(&0) {
        return Err(FrameError::InteriorNul);
    }
    let len = address.len() + 1;
    let wire_len = i32::try_from(len).map_err(|_| FrameError::InvalidLength(i32::MAX))?;

    let mut prefix = BytesMut::with_capacity(ADDRESS_LENGTH_LEN);
    prefix.put_i32_le(wire_len);

    let mut text = BytesMut::with_capacity(len);
    text.put_slice(address.as_bytes());
    text.put_u8(0);

    Ok((prefix.freeze(), text.freeze()))
}

/// Decodes the length message of an address record.
pub fn decode_address_length(frame: &[u8]) -> Result<usize, FrameError> {
    let bytes: [u8; ADDRESS_LENGTH_LEN] = frame.try_into().map_err(|_| FrameError::Size {
        expected: ADDRESS_LENGTH_LEN,
        actual: frame.len(),
    })?;
    let len = i32::from_le_bytes(bytes);
    if len < 1 {
        return Err(FrameError::InvalidLength(len));
    }
    Ok(len as usize)
}

/// Decodes the text message of an address record announced as `expected_len` bytes.
pub fn decode_address(frame: &[u8], expected_len: usize) -> Result<String, FrameError> {
    if frame.len() != expected_len {
        return Err(FrameError::Size {
            expected: expected_len,
            actual: frame.len(),
        });
    }
    let Some((&0, text)) = frame.split_last() else {
        return Err(FrameError::MissingTerminator);
    };
    if text.contains(&0) {
        return Err(FrameError::InteriorNul);
    }
    String::from_utf8(text.to_vec()).map_err(|_| FrameError::NotUtf8)
}
