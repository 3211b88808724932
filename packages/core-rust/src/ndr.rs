//! Network Data Representation (NDR 2.0, little-endian) reader and writer.
//!
//! Primitives are naturally aligned relative to the start of the stub, so a
//! reader or writer must be created at the first byte of the stub data, not
//! at the start of the PDU that carries it.
//!
//! Both traits are object safe: envelopes decode from `&mut dyn NdrRead` so
//! the router never needs to know which buffer type the transport uses.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError};

/// First referent id handed out by [`NdrWriter`]. Ids grow in steps of 4.
pub const FIRST_REFERENT_ID: u32 = 0x0002_0000;

const ZERO_PAD: [u8; 8] = [0; 8];

fn padding(position: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two() && alignment <= 8);
    (alignment - position % alignment) % alignment
}

// ---------------------------------------------------------------------------
// NdrRead
// ---------------------------------------------------------------------------

/// Sequential, fallible access to an NDR-encoded stub.
pub trait NdrRead {
    /// Bytes consumed so far.
    fn position(&self) -> usize;

    /// Bytes left to read.
    fn remaining(&self) -> usize;

    /// Fills `buf` completely or fails without consuming anything.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError>;

    /// Skips `count` bytes or fails without consuming anything.
    fn skip(&mut self, count: usize) -> Result<(), DecodeError>;

    /// Skips padding up to the next multiple of `alignment`.
    fn align(&mut self, alignment: usize) -> Result<(), DecodeError> {
        let pad = padding(self.position(), alignment);
        self.skip(pad)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.align(2)?;
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.align(4)?;
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.align(4)?;
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.align(8)?;
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a pointer referent id. Zero is the null pointer.
    fn read_referent(&mut self) -> Result<u32, DecodeError> {
        self.read_u32()
    }

    /// Reads a conformant-varying UTF-16 string (`[string] wchar_t*` body).
    ///
    /// A trailing NUL terminator is stripped; an unterminated string is
    /// accepted as-is.
    fn read_wide_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let max_count = self.read_u32()?;
        let offset = self.read_u32()?;
        let actual_count = self.read_u32()?;
        if offset != 0 {
            return Err(DecodeError::InvalidOffset { field, offset });
        }
        if actual_count > max_count {
            return Err(DecodeError::LengthMismatch {
                field,
                declared: max_count,
                actual: actual_count,
            });
        }

        let byte_len = actual_count as usize * 2;
        ensure_remaining(self, byte_len)?;
        let mut raw = vec![0u8; byte_len];
        self.read_exact(&mut raw)?;

        let mut units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if units.last() == Some(&0) {
            units.pop();
        }
        String::from_utf16(&units).map_err(|_| DecodeError::InvalidString { field })
    }

    /// Reads a `[unique, string]` pointer: referent id, then the string if non-null.
    fn read_unique_wide_string(
        &mut self,
        field: &'static str,
    ) -> Result<Option<String>, DecodeError> {
        if self.read_referent()? == 0 {
            return Ok(None);
        }
        self.read_wide_string(field).map(Some)
    }

    /// Reads a conformant byte array (`[size_is(n)] byte*` body).
    fn read_byte_array(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let count = self.read_u32()? as usize;
        ensure_remaining(self, count).map_err(|err| match err {
            DecodeError::Truncated { .. } => DecodeError::LengthMismatch {
                field,
                declared: u32::try_from(count).unwrap_or(u32::MAX),
                actual: u32::try_from(self.remaining()).unwrap_or(u32::MAX),
            },
            other => other,
        })?;
        let mut bytes = vec![0u8; count];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

/// Rejects length prefixes larger than the rest of the buffer before anything
/// is allocated for them.
fn ensure_remaining<R: NdrRead + ?Sized>(reader: &R, needed: usize) -> Result<(), DecodeError> {
    let remaining = reader.remaining();
    if needed > remaining {
        return Err(DecodeError::Truncated {
            offset: reader.position(),
            needed,
            remaining,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// NdrWrite
// ---------------------------------------------------------------------------

/// Sequential NDR encoder.
pub trait NdrWrite {
    /// Bytes written so far.
    fn position(&self) -> usize;

    fn write_bytes(&mut self, bytes: &[u8]);

    /// Allocates the next non-null pointer referent id.
    fn next_referent(&mut self) -> u32;

    /// Writes zero padding up to the next multiple of `alignment`.
    fn align(&mut self, alignment: usize) {
        let pad = padding(self.position(), alignment);
        self.write_bytes(&ZERO_PAD[..pad]);
    }

    fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    fn write_u16(&mut self, value: u16) {
        self.align(2);
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.align(4);
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_i32(&mut self, value: i32) {
        self.align(4);
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.align(8);
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a NUL-terminated conformant-varying UTF-16 string.
    fn write_wide_string(&mut self, field: &'static str, value: &str) -> Result<(), EncodeError> {
        let mut units: Vec<u16> = value.encode_utf16().collect();
        units.push(0);
        let count = u32::try_from(units.len()).map_err(|_| EncodeError::TooLong {
            field,
            len: units.len(),
        })?;
        self.write_u32(count);
        self.write_u32(0);
        self.write_u32(count);
        for unit in units {
            self.write_bytes(&unit.to_le_bytes());
        }
        Ok(())
    }

    /// Writes a `[unique, string]` pointer; `None` is the null pointer.
    fn write_unique_wide_string(
        &mut self,
        field: &'static str,
        value: Option<&str>,
    ) -> Result<(), EncodeError> {
        match value {
            None => {
                self.write_u32(0);
                Ok(())
            }
            Some(value) => {
                let referent = self.next_referent();
                self.write_u32(referent);
                self.write_wide_string(field, value)
            }
        }
    }

    /// Writes a conformant byte array.
    fn write_byte_array(&mut self, field: &'static str, bytes: &[u8]) -> Result<(), EncodeError> {
        let count = u32::try_from(bytes.len()).map_err(|_| EncodeError::TooLong {
            field,
            len: bytes.len(),
        })?;
        self.write_u32(count);
        self.write_bytes(bytes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NdrReader
// ---------------------------------------------------------------------------

/// [`NdrRead`] over an immutable `Bytes` buffer.
#[derive(Debug, Clone)]
pub struct NdrReader {
    buf: Bytes,
    pos: usize,
}

impl NdrReader {
    #[must_use]
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Consumes the reader, returning the unread tail without copying.
    #[must_use]
    pub fn into_remaining(self) -> Bytes {
        self.buf.slice(self.pos..)
    }

    fn end_of(&self, needed: usize) -> Result<usize, DecodeError> {
        let remaining = self.buf.len() - self.pos;
        if needed > remaining {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed,
                remaining,
            });
        }
        Ok(self.pos + needed)
    }
}

impl NdrRead for NdrReader {
    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), DecodeError> {
        let end = self.end_of(out.len())?;
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        self.pos = self.end_of(count)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NdrWriter
// ---------------------------------------------------------------------------

/// [`NdrWrite`] into a growable `BytesMut` buffer.
#[derive(Debug)]
pub struct NdrWriter {
    buf: BytesMut,
    next_referent: u32,
}

impl NdrWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            next_referent: FIRST_REFERENT_ID,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Finishes encoding and returns the immutable buffer.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for NdrWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl NdrWrite for NdrWriter {
    fn position(&self) -> usize {
        self.buf.len()
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    fn next_referent(&mut self) -> u32 {
        let referent = self.next_referent;
        self.next_referent = referent.wrapping_add(4);
        referent
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
