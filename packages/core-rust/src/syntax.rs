//! Interface syntax identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::ndr::{NdrRead, NdrWrite};

/// Identifies one interface version: interface UUID plus major.minor version.
///
/// Two syntaxes with the same UUID but different versions are different
/// interfaces and register independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxId {
    pub uuid: Uuid,
    pub version_major: u16,
    pub version_minor: u16,
}

impl SyntaxId {
    #[must_use]
    pub const fn new(uuid: Uuid, version_major: u16, version_minor: u16) -> Self {
        Self {
            uuid,
            version_major,
            version_minor,
        }
    }

    /// Returns the same interface at a different version.
    #[must_use]
    pub const fn with_version(self, version_major: u16, version_minor: u16) -> Self {
        Self::new(self.uuid, version_major, version_minor)
    }

    /// Decodes the 20-byte wire form (mixed-endian UUID, then u32 version).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] when fewer than 20 bytes remain.
    pub fn decode(r: &mut dyn NdrRead) -> Result<Self, DecodeError> {
        r.align(4)?;
        let mut raw = [0u8; 16];
        r.read_exact(&mut raw)?;
        let version = r.read_u32()?;
        Ok(Self {
            uuid: Uuid::from_bytes_le(raw),
            version_major: (version & 0xFFFF) as u16,
            version_minor: (version >> 16) as u16,
        })
    }

    pub fn encode(&self, w: &mut dyn NdrWrite) {
        w.align(4);
        w.write_bytes(&self.uuid.to_bytes_le());
        w.write_u32(u32::from(self.version_major) | (u32::from(self.version_minor) << 16));
    }
}

impl fmt::Display for SyntaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{}.{}",
            self.uuid, self.version_major, self.version_minor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndr::{NdrReader, NdrWriter};

    const IFACE: Uuid = Uuid::from_u128(0xb97d_b8b2_4c63_11cf_bff6_08002be23f2f);

    #[test]
    fn display_includes_version() {
        let syntax = SyntaxId::new(IFACE, 3, 0);
        assert_eq!(
            syntax.to_string(),
            "b97db8b2-4c63-11cf-bff6-08002be23f2f v3.0"
        );
    }

    #[test]
    fn versions_are_distinct_identities() {
        let v1 = SyntaxId::new(IFACE, 1, 0);
        assert_ne!(v1, v1.with_version(2, 0));
        assert_eq!(v1, v1.with_version(1, 0));
    }

    #[test]
    fn wire_form_uses_mixed_endian_uuid() {
        let syntax = SyntaxId::new(IFACE, 2, 1);
        let mut w = NdrWriter::new();
        syntax.encode(&mut w);
        let bytes = w.freeze();

        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[..4], &[0xb2, 0xb8, 0x7d, 0xb9]);
        assert_eq!(&bytes[16..], &[2, 0, 1, 0]);

        let mut r = NdrReader::new(bytes);
        assert_eq!(SyntaxId::decode(&mut r).unwrap(), syntax);
    }

    #[test]
    fn serde_representation_is_stable() {
        let syntax = SyntaxId::new(IFACE, 1, 0);
        let json = serde_json::to_value(syntax).unwrap();
        assert_eq!(json["version_major"], 1);
        assert_eq!(json["uuid"], "b97db8b2-4c63-11cf-bff6-08002be23f2f");
    }
}
