//! Metrics middleware for calls.
//!
//! Records call duration and outcome in a `tracing` span and through the
//! `metrics` facade:
//!
//! - `rpcgate_calls_total{interface, outcome}` (counter)
//! - `rpcgate_call_duration_seconds{interface}` (histogram)
//!
//! No recorder is installed here; without one the macros are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::dispatch::{CallError, CallReply, InboundCall};

pub const CALLS_TOTAL: &str = "rpcgate_calls_total";
pub const CALL_DURATION_SECONDS: &str = "rpcgate_call_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments calls with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<InboundCall> for MetricsService<S>
where
    S: Service<InboundCall, Response = CallReply, Error = CallError> + Send,
    S::Future: Send + 'static,
{
    type Response = CallReply;
    type Error = CallError;
    type Future = Pin<Box<dyn Future<Output = Result<CallReply, CallError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: InboundCall) -> Self::Future {
        let interface = call.ctx.syntax.uuid.to_string();
        let call_id = call.ctx.call_id;
        let opnum = call.ctx.opnum;

        let span = info_span!(
            "rpc_call",
            interface = %interface,
            opnum = opnum,
            call_id = call_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(CallReply::Response(_)) => "ok",
                    Ok(CallReply::Inert) => "inert",
                    Err(err) => err.label(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(CALLS_TOTAL, "interface" => interface.clone(), "outcome" => outcome)
                    .increment(1);
                metrics::histogram!(CALL_DURATION_SECONDS, "interface" => interface)
                    .record(elapsed.as_secs_f64());

                tracing::info!(
                    call_id = call_id,
                    opnum = opnum,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "call complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
