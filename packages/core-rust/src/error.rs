//! Codec errors.
//!
//! `DecodeError` is fatal to a single call, never to the connection that
//! carried it. `EncodeError` only arises when a value cannot be represented
//! on the wire at all.

/// Failure to decode a stub or PDU body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer truncated: needed {needed} bytes at offset {offset}, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("{field}: invalid discriminant {value:#x}")]
    InvalidDiscriminant { field: &'static str, value: u32 },
    #[error("{field}: declared length {declared} does not match actual length {actual}")]
    LengthMismatch {
        field: &'static str,
        declared: u32,
        actual: u32,
    },
    #[error("{field}: unsupported varying offset {offset}")]
    InvalidOffset { field: &'static str, offset: u32 },
    #[error("{field}: string is not valid UTF-16")]
    InvalidString { field: &'static str },
}

/// Failure to encode a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("{field}: length {len} exceeds the 32-bit wire limit")]
    TooLong { field: &'static str, len: usize },
}
