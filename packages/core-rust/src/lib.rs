//! `rpcgate` Core: NDR wire codec, syntax identifiers, context handles and PDU bodies.

pub mod error;
pub mod handle;
pub mod ndr;
pub mod pdu;
pub mod syntax;

pub use error::{DecodeError, EncodeError};
pub use handle::ContextHandle;
pub use ndr::{NdrRead, NdrReader, NdrWrite, NdrWriter};
pub use pdu::{FaultHeader, FaultStatus, RequestHeader, ResponseHeader};
pub use syntax::SyntaxId;
