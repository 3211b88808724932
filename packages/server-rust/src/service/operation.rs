//! Call context, service errors and routing outcomes.

use std::net::SocketAddr;

use rpcgate_core::{DecodeError, FaultStatus, SyntaxId};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::envelope::Operation;

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Context carried with every call from the transport into the contract method.
///
/// The router reads only `max_stub_size`; deadlines and cancellation are
/// driven by the transport through `cancellation`.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: u64,
    pub connection_id: u64,
    /// Presentation context the request arrived on.
    pub context_id: u16,
    pub opnum: u16,
    pub syntax: SyntaxId,
    /// Object UUID from the request header, if the client sent one.
    pub object: Option<Uuid>,
    pub peer: Option<SocketAddr>,
    pub call_timeout_ms: u64,
    /// Largest request stub the router will decode.
    pub max_stub_size: usize,
    pub cancellation: CancellationToken,
}

impl CallContext {
    /// Creates a context with no connection metadata and a fresh cancellation token.
    #[must_use]
    pub fn new(call_id: u64, syntax: SyntaxId, opnum: u16, call_timeout_ms: u64) -> Self {
        Self {
            call_id,
            connection_id: 0,
            context_id: 0,
            opnum,
            syntax,
            object: None,
            peer: None,
            call_timeout_ms,
            max_stub_size: usize::MAX,
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// ServiceError / Failure
// ---------------------------------------------------------------------------

/// Errors returned by contract methods.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("operation not implemented: {operation}")]
    NotImplemented { operation: &'static str },
    #[error("call rejected with {status}")]
    Fault { status: FaultStatus },
    #[error("call cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    #[must_use]
    pub fn not_implemented(operation: &'static str) -> Self {
        Self::NotImplemented { operation }
    }

    /// Fault status reported to the peer when this error is sent as a fault.
    #[must_use]
    pub fn fault_status(&self) -> FaultStatus {
        match self {
            Self::NotImplemented { .. } => FaultStatus::CANNOT_SUPPORT,
            Self::Fault { status } => *status,
            Self::Cancelled => FaultStatus::CALL_CANCELLED,
            Self::Internal(_) => FaultStatus::CALL_FAILED,
        }
    }
}

/// A failed contract call: the error, plus whatever response the method
/// produced before failing.
///
/// The response travels back to the peer alongside the error, so a method can
/// report a payload-level status and an out-of-band failure at the same time.
#[derive(Debug)]
pub struct Failure<T> {
    pub response: Option<T>,
    pub error: ServiceError,
}

impl<T> Failure<T> {
    #[must_use]
    pub fn new(error: ServiceError) -> Self {
        Self {
            response: None,
            error,
        }
    }

    #[must_use]
    pub fn with_response(response: T, error: ServiceError) -> Self {
        Self {
            response: Some(response),
            error,
        }
    }
}

impl<T> From<ServiceError> for Failure<T> {
    fn from(error: ServiceError) -> Self {
        Self::new(error)
    }
}

impl<T> From<anyhow::Error> for Failure<T> {
    fn from(error: anyhow::Error) -> Self {
        Self::new(ServiceError::Internal(error))
    }
}

/// Return type of every contract method.
pub type ServiceResult<T> = Result<T, Failure<T>>;

// ---------------------------------------------------------------------------
// RouteError
// ---------------------------------------------------------------------------

/// Outcome of routing one call that did not produce a plain response.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("{interface}: unknown opnum {opnum}")]
    UnknownOpnum { interface: &'static str, opnum: u16 },
    #[error("{operation}: failed to decode request: {source}")]
    Decode {
        operation: &'static str,
        source: DecodeError,
    },
    #[error("{operation}: stub of {size} bytes exceeds the {limit} byte limit")]
    StubTooLarge {
        operation: &'static str,
        size: usize,
        limit: usize,
    },
    /// The contract method failed. `envelope` is the outgoing envelope with
    /// any attached response folded in.
    #[error("{operation}: {source}")]
    Application {
        operation: &'static str,
        envelope: Box<dyn Operation>,
        response_attached: bool,
        source: ServiceError,
    },
}

impl RouteError {
    /// Envelope accompanying an application failure.
    #[must_use]
    pub fn envelope(&self) -> Option<&dyn Operation> {
        match self {
            Self::Application { envelope, .. } => Some(envelope.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_envelope(self) -> Option<Box<dyn Operation>> {
        match self {
            Self::Application { envelope, .. } => Some(envelope),
            _ => None,
        }
    }
}

/// Result of [`InterfaceRouter::route`](super::router::InterfaceRouter::route).
/// `Ok(None)` means a reserved opnum: nothing to send back.
pub type RouteResult = Result<Option<Box<dyn Operation>>, RouteError>;
