//! Call dispatch: turns an inbound stub into a response stub or a typed failure.
//!
//! `CallDispatcher` is the innermost service of the call pipeline. It owns
//! everything between the transport and the router: the stub size limit,
//! syntax resolution, response encoding and panic containment. The limit
//! travels in the call context and is applied by the router, after reserved
//! and unknown opnums are resolved and before anything is decoded.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::FutureExt;
use rpcgate_core::{DecodeError, EncodeError, FaultStatus, NdrReader, SyntaxId};
use tower::Service;

use super::operation::{CallContext, RouteError, RouteResult, ServiceError};
use super::registry::HandlerRegistry;

// ---------------------------------------------------------------------------
// InboundCall / CallReply / CallError
// ---------------------------------------------------------------------------

/// One call as handed over by the transport. Syntax and opnum travel in `ctx`.
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub ctx: CallContext,
    pub stub: Bytes,
}

/// Successful outcome of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReply {
    /// Encoded response stub.
    Response(Bytes),
    /// Reserved opnum: nothing is sent back.
    Inert,
}

/// Every way a call can fail after it reaches the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("no interface registered for {syntax}")]
    UnknownInterface { syntax: SyntaxId },
    #[error("{interface}: unknown opnum {opnum}")]
    UnknownOpnum { interface: &'static str, opnum: u16 },
    #[error("{operation}: bad stub data: {source}")]
    Decode {
        operation: &'static str,
        source: DecodeError,
    },
    /// The contract method failed. `stub` holds the encoded response when
    /// the method attached one.
    #[error("{operation}: {source}")]
    Application {
        operation: &'static str,
        stub: Option<Bytes>,
        source: ServiceError,
    },
    #[error("{operation}: failed to encode response: {source}")]
    Encode {
        operation: &'static str,
        source: EncodeError,
    },
    #[error("stub of {size} bytes exceeds the {limit} byte limit")]
    StubTooLarge { size: usize, limit: usize },
    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("opnum {opnum}: handler panicked")]
    Panicked { opnum: u16 },
}

impl CallError {
    /// Fault status sent to the peer when this error is reported as a fault.
    #[must_use]
    pub fn fault_status(&self) -> FaultStatus {
        match self {
            Self::UnknownInterface { .. } => FaultStatus::UNKNOWN_INTERFACE,
            Self::UnknownOpnum { .. } => FaultStatus::OP_RNG_ERROR,
            Self::Decode { .. } => FaultStatus::BAD_STUB_DATA,
            Self::Application { source, .. } => source.fault_status(),
            Self::Encode { .. } | Self::Panicked { .. } => FaultStatus::CALL_FAILED,
            Self::StubTooLarge { .. } => FaultStatus::PROTOCOL_ERROR,
            Self::Timeout { .. } => FaultStatus::CALL_CANCELLED,
            Self::Overloaded => FaultStatus::SERVER_TOO_BUSY,
        }
    }

    /// Short label used for the `outcome` metric dimension.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnknownInterface { .. } => "unknown_interface",
            Self::UnknownOpnum { .. } => "unknown_opnum",
            Self::Decode { .. } => "decode_error",
            Self::Application { .. } => "application_error",
            Self::Encode { .. } => "encode_error",
            Self::StubTooLarge { .. } => "stub_too_large",
            Self::Timeout { .. } => "timeout",
            Self::Overloaded => "overloaded",
            Self::Panicked { .. } => "panicked",
        }
    }
}

// ---------------------------------------------------------------------------
// CallDispatcher
// ---------------------------------------------------------------------------

/// Innermost pipeline service: resolves the syntax and routes the call.
#[derive(Debug, Clone)]
pub struct CallDispatcher {
    registry: HandlerRegistry,
    max_stub_size: usize,
}

impl CallDispatcher {
    #[must_use]
    pub fn new(registry: HandlerRegistry, max_stub_size: usize) -> Self {
        Self {
            registry,
            max_stub_size,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

impl Service<InboundCall> for CallDispatcher {
    type Response = CallReply;
    type Error = CallError;
    type Future = Pin<Box<dyn Future<Output = Result<CallReply, CallError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: InboundCall) -> Self::Future {
        let InboundCall { mut ctx, stub } = call;
        ctx.max_stub_size = self.max_stub_size;

        let syntax = ctx.syntax;
        let Some(handle) = self.registry.handle_for(&syntax) else {
            tracing::debug!(%syntax, call_id = ctx.call_id, "call for unregistered interface");
            return Box::pin(async move { Err(CallError::UnknownInterface { syntax }) });
        };

        let opnum = ctx.opnum;
        let call_id = ctx.call_id;
        let mut reader = NdrReader::new(stub);

        // Decoding runs synchronously inside the handle, so a panic can
        // surface here as well as in the returned future.
        let routed = std::panic::catch_unwind(AssertUnwindSafe(|| handle(ctx, opnum, &mut reader)));
        let Ok(pending) = routed else {
            tracing::error!(%syntax, opnum, call_id, "handler panicked while decoding");
            return Box::pin(async move { Err(CallError::Panicked { opnum }) });
        };

        Box::pin(async move {
            match AssertUnwindSafe(pending).catch_unwind().await {
                Ok(result) => finish(result),
                Err(_) => {
                    tracing::error!(%syntax, opnum, call_id, "handler panicked");
                    Err(CallError::Panicked { opnum })
                }
            }
        })
    }
}

/// Maps a routing outcome onto the pipeline's reply and error types.
fn finish(result: RouteResult) -> Result<CallReply, CallError> {
    match result {
        Ok(Some(op)) => op
            .response_stub()
            .map(CallReply::Response)
            .map_err(|source| CallError::Encode {
                operation: op.name(),
                source,
            }),
        Ok(None) => Ok(CallReply::Inert),
        Err(RouteError::UnknownOpnum { interface, opnum }) => {
            Err(CallError::UnknownOpnum { interface, opnum })
        }
        Err(RouteError::StubTooLarge {
            operation,
            size,
            limit,
        }) => {
            tracing::debug!(operation, size, limit, "rejecting oversized stub");
            Err(CallError::StubTooLarge { size, limit })
        }
        Err(RouteError::Decode { operation, source }) => {
            tracing::debug!(operation, error = %source, "rejecting malformed stub");
            Err(CallError::Decode { operation, source })
        }
        Err(RouteError::Application {
            operation,
            envelope,
            response_attached,
            source,
        }) => {
            let stub = if response_attached {
                Some(
                    envelope
                        .response_stub()
                        .map_err(|source| CallError::Encode { operation, source })?,
                )
            } else {
                None
            };
            Err(CallError::Application {
                operation,
                stub,
                source,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
