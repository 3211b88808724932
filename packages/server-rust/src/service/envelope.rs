//! Per-opnum operation envelopes and their typed converters.
//!
//! An envelope is the intermediate value for one call: it decodes the request
//! stub, carries the request fields to the contract method and the response
//! fields back, and encodes the response stub. Envelopes know nothing about
//! the contract; converters (`FromEnvelope` / `IntoEnvelope`) translate between
//! envelopes and the typed request and response values the contract sees.

use std::any::Any;
use std::fmt;

use bytes::Bytes;
use rpcgate_core::{DecodeError, EncodeError, NdrRead, NdrWrite, NdrWriter};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Wire-level value for one operation.
///
/// The server side uses `decode_request` and `encode_response`; the client
/// side uses `encode_request` and `decode_response`.
pub trait Envelope: Default + fmt::Debug + Send + Sync + 'static {
    const OPNUM: u16;
    const NAME: &'static str;

    /// Populates the `[in]` fields from a request stub.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] on a malformed or truncated stub. The
    /// envelope must be discarded afterwards.
    fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError>;

    /// Writes the `[out]` fields as a response stub.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] when a field cannot be represented on the wire.
    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError>;

    /// Writes the `[in]` fields as a request stub.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] when a field cannot be represented on the wire.
    fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError>;

    /// Populates the `[out]` fields from a response stub.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] on a malformed or truncated stub.
    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError>;
}

// ---------------------------------------------------------------------------
// Operation (type-erased envelope)
// ---------------------------------------------------------------------------

/// Type-erased envelope handed back to the transport after routing.
pub trait Operation: fmt::Debug + Send + Sync + 'static {
    fn opnum(&self) -> u16;

    fn name(&self) -> &'static str;

    /// Encodes the response stub.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] when a field cannot be represented on the wire.
    fn marshal_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: Envelope> Operation for E {
    fn opnum(&self) -> u16 {
        E::OPNUM
    }

    fn name(&self) -> &'static str {
        E::NAME
    }

    fn marshal_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        self.encode_response(w)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Operation {
    /// Returns the concrete envelope if this operation is an `E`.
    #[must_use]
    pub fn downcast_ref<E: Envelope>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Encodes the response stub into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] when a field cannot be represented on the wire.
    pub fn response_stub(&self) -> Result<Bytes, EncodeError> {
        let mut w = NdrWriter::new();
        self.marshal_response(&mut w)?;
        Ok(w.freeze())
    }
}

// ---------------------------------------------------------------------------
// Converters
// ---------------------------------------------------------------------------

/// A typed request or response bound to one envelope type.
pub trait OperationValue: Send + 'static {
    type Envelope: Envelope;
}

/// Lossless projection of an envelope onto a typed value.
pub trait FromEnvelope: OperationValue {
    fn from_envelope(envelope: &Self::Envelope) -> Self;
}

/// Folds a typed value's wire-relevant fields onto an envelope.
pub trait IntoEnvelope: OperationValue {
    fn into_envelope(self, envelope: Self::Envelope) -> Self::Envelope;
}

/// Folds an optional response onto `envelope`; `None` leaves it untouched.
pub fn fold_response<R: IntoEnvelope>(response: Option<R>, envelope: R::Envelope) -> R::Envelope {
    match response {
        Some(response) => response.into_envelope(envelope),
        None => envelope,
    }
}
