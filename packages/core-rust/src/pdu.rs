//! Connection-oriented request, response and fault PDU bodies.
//!
//! Only the body that follows the common 16-byte PDU header is modelled here;
//! framing, fragmentation and authentication trailers belong to the transport.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::ndr::{NdrRead, NdrWrite, NdrWriter};

// ---------------------------------------------------------------------------
// FaultStatus
// ---------------------------------------------------------------------------

/// Status code carried by a fault PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultStatus(pub u32);

impl FaultStatus {
    pub const ACCESS_DENIED: Self = Self(0x0000_0005);
    pub const SERVER_TOO_BUSY: Self = Self(0x0000_06bb);
    pub const CALL_FAILED: Self = Self(0x0000_06be);
    pub const CANNOT_SUPPORT: Self = Self(0x0000_06e4);
    pub const BAD_STUB_DATA: Self = Self(0x0000_06f7);
    pub const CALL_CANCELLED: Self = Self(0x0000_071a);
    pub const OP_RNG_ERROR: Self = Self(0x1c01_0002);
    pub const UNKNOWN_INTERFACE: Self = Self(0x1c01_0003);
    pub const PROTOCOL_ERROR: Self = Self(0x1c01_000b);

    /// Symbolic name for well-known statuses.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::ACCESS_DENIED => "nca_s_fault_access_denied",
            Self::SERVER_TOO_BUSY => "rpc_s_server_too_busy",
            Self::CALL_FAILED => "rpc_s_call_failed",
            Self::CANNOT_SUPPORT => "rpc_s_cannot_support",
            Self::BAD_STUB_DATA => "rpc_x_bad_stub_data",
            Self::CALL_CANCELLED => "rpc_s_call_cancelled",
            Self::OP_RNG_ERROR => "nca_s_op_rng_error",
            Self::UNKNOWN_INTERFACE => "nca_s_unk_if",
            Self::PROTOCOL_ERROR => "nca_s_proto_error",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#010x})", self.0),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Request PDU body header. The stub data follows immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub alloc_hint: u32,
    pub context_id: u16,
    pub opnum: u16,
    /// Present only when the PDU header sets the object-UUID flag.
    pub object: Option<Uuid>,
}

impl RequestHeader {
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] on a short body.
    pub fn decode(r: &mut dyn NdrRead, object_present: bool) -> Result<Self, DecodeError> {
        let alloc_hint = r.read_u32()?;
        let context_id = r.read_u16()?;
        let opnum = r.read_u16()?;
        let object = if object_present {
            let mut raw = [0u8; 16];
            r.read_exact(&mut raw)?;
            Some(Uuid::from_bytes_le(raw))
        } else {
            None
        };
        Ok(Self {
            alloc_hint,
            context_id,
            opnum,
            object,
        })
    }

    pub fn encode(&self, w: &mut dyn NdrWrite) {
        w.write_u32(self.alloc_hint);
        w.write_u16(self.context_id);
        w.write_u16(self.opnum);
        if let Some(object) = self.object {
            w.write_bytes(&object.to_bytes_le());
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Response PDU body header. The stub data follows immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
}

impl ResponseHeader {
    /// Header for a response carrying `stub_len` bytes of stub data.
    #[must_use]
    pub fn for_stub(context_id: u16, stub_len: usize) -> Self {
        Self {
            alloc_hint: u32::try_from(stub_len).unwrap_or(u32::MAX),
            context_id,
            cancel_count: 0,
        }
    }

    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] on a short body.
    pub fn decode(r: &mut dyn NdrRead) -> Result<Self, DecodeError> {
        let alloc_hint = r.read_u32()?;
        let context_id = r.read_u16()?;
        let cancel_count = r.read_u8()?;
        r.skip(1)?;
        Ok(Self {
            alloc_hint,
            context_id,
            cancel_count,
        })
    }

    pub fn encode(&self, w: &mut dyn NdrWrite) {
        w.write_u32(self.alloc_hint);
        w.write_u16(self.context_id);
        w.write_u8(self.cancel_count);
        w.write_u8(0);
    }
}

/// Builds a complete response body: header followed by `stub`.
#[must_use]
pub fn response_body(context_id: u16, stub: &[u8]) -> Bytes {
    let mut w = NdrWriter::with_capacity(8 + stub.len());
    ResponseHeader::for_stub(context_id, stub.len()).encode(&mut w);
    w.write_bytes(stub);
    w.freeze()
}

// ---------------------------------------------------------------------------
// Fault
// ---------------------------------------------------------------------------

/// Fault PDU body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultHeader {
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub flags: u8,
    pub status: FaultStatus,
}

impl FaultHeader {
    #[must_use]
    pub const fn new(context_id: u16, status: FaultStatus) -> Self {
        Self {
            alloc_hint: 0,
            context_id,
            cancel_count: 0,
            flags: 0,
            status,
        }
    }

    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] on a short body.
    pub fn decode(r: &mut dyn NdrRead) -> Result<Self, DecodeError> {
        let alloc_hint = r.read_u32()?;
        let context_id = r.read_u16()?;
        let cancel_count = r.read_u8()?;
        let flags = r.read_u8()?;
        let status = FaultStatus(r.read_u32()?);
        r.skip(4)?;
        Ok(Self {
            alloc_hint,
            context_id,
            cancel_count,
            flags,
            status,
        })
    }

    pub fn encode(&self, w: &mut dyn NdrWrite) {
        w.write_u32(self.alloc_hint);
        w.write_u16(self.context_id);
        w.write_u8(self.cancel_count);
        w.write_u8(self.flags);
        w.write_u32(self.status.0);
        w.write_bytes(&[0; 4]);
    }

    /// Encodes the 16-byte fault body.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut w = NdrWriter::with_capacity(16);
        self.encode(&mut w);
        w.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndr::NdrReader;

    #[test]
    fn request_header_without_object() {
        let mut r = NdrReader::new(vec![0x10, 0, 0, 0, 0x01, 0x00, 0x05, 0x00, 0xAA]);
        let header = RequestHeader::decode(&mut r, false).unwrap();
        assert_eq!(
            header,
            RequestHeader {
                alloc_hint: 16,
                context_id: 1,
                opnum: 5,
                object: None
            }
        );
        assert_eq!(r.into_remaining().as_ref(), &[0xAA]);
    }

    #[test]
    fn request_header_with_object() {
        let header = RequestHeader {
            alloc_hint: 0,
            context_id: 2,
            opnum: 9,
            object: Some(Uuid::from_u128(0x1234)),
        };
        let mut w = NdrWriter::new();
        header.encode(&mut w);
        assert_eq!(w.len(), 24);

        let mut r = NdrReader::new(w.freeze());
        assert_eq!(RequestHeader::decode(&mut r, true).unwrap(), header);
    }

    #[test]
    fn response_body_prefixes_stub() {
        let body = response_body(3, &[1, 2, 3]);
        assert_eq!(body.as_ref(), &[3, 0, 0, 0, 3, 0, 0, 0, 1, 2, 3]);

        let mut r = NdrReader::new(body);
        let header = ResponseHeader::decode(&mut r).unwrap();
        assert_eq!(header.alloc_hint, 3);
        assert_eq!(header.context_id, 3);
    }

    #[test]
    fn fault_body_layout() {
        let body = FaultHeader::new(1, FaultStatus::OP_RNG_ERROR).to_bytes();
        assert_eq!(body.len(), 16);
        assert_eq!(&body[8..12], &[0x02, 0x00, 0x01, 0x1c]);

        let mut r = NdrReader::new(body);
        let fault = FaultHeader::decode(&mut r).unwrap();
        assert_eq!(fault.status, FaultStatus::OP_RNG_ERROR);
        assert_eq!(fault.context_id, 1);
    }

    #[test]
    fn fault_status_display() {
        assert_eq!(
            FaultStatus::UNKNOWN_INTERFACE.to_string(),
            "nca_s_unk_if (0x1c010003)"
        );
        assert_eq!(FaultStatus(0xdead).to_string(), "0x0000dead");
    }
}
