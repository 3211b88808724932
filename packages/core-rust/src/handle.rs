//! Context handles: opaque server-side state references carried by calls.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::ndr::{NdrRead, NdrWrite};

/// 20-byte context handle. The all-zero handle is the null handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle {
    pub attributes: u32,
    pub uuid: Uuid,
}

impl ContextHandle {
    pub const NULL: Self = Self {
        attributes: 0,
        uuid: Uuid::nil(),
    };

    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self {
            attributes: 0,
            uuid,
        }
    }

    /// Creates a handle with a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.attributes == 0 && self.uuid.is_nil()
    }

    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] when fewer than 20 bytes remain.
    pub fn decode(r: &mut dyn NdrRead) -> Result<Self, DecodeError> {
        let attributes = r.read_u32()?;
        let mut raw = [0u8; 16];
        r.read_exact(&mut raw)?;
        Ok(Self {
            attributes,
            uuid: Uuid::from_bytes_le(raw),
        })
    }

    pub fn encode(&self, w: &mut dyn NdrWrite) {
        w.write_u32(self.attributes);
        w.write_bytes(&self.uuid.to_bytes_le());
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}", self.attributes, self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndr::{NdrReader, NdrWriter};

    #[test]
    fn default_is_null() {
        assert!(ContextHandle::default().is_null());
        assert!(!ContextHandle::generate().is_null());
    }

    #[test]
    fn encodes_to_twenty_bytes() {
        let handle = ContextHandle::new(Uuid::from_u128(7));
        let mut w = NdrWriter::new();
        handle.encode(&mut w);
        assert_eq!(w.len(), 20);

        let mut r = NdrReader::new(w.freeze());
        assert_eq!(ContextHandle::decode(&mut r).unwrap(), handle);
    }

    #[test]
    fn short_buffer_is_truncated() {
        let mut r = NdrReader::new(vec![0u8; 12]);
        assert!(matches!(
            ContextHandle::decode(&mut r),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
