//! Tower middleware layers for the call pipeline.
//!
//! - [`timeout`]: Per-call timeout enforcement
//! - [`metrics`]: Call timing and counting via `tracing` spans and `metrics`
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_call_pipeline, CallPipeline};
pub use timeout::TimeoutLayer;

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use bytes::Bytes;
    use tower::Service;

    use crate::interfaces::cluster::CLUSTER_SYNTAX_V3_0;
    use crate::service::dispatch::{CallError, CallReply, InboundCall};
    use crate::service::operation::CallContext;

    /// Service that answers `Inert` after a configurable delay.
    pub(crate) struct SlowService {
        pub(crate) delay_ms: u64,
    }

    impl Service<InboundCall> for SlowService {
        type Response = CallReply;
        type Error = CallError;
        type Future = Pin<Box<dyn Future<Output = Result<CallReply, CallError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _call: InboundCall) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(CallReply::Inert)
            })
        }
    }

    pub(crate) fn make_call(call_id: u64, timeout_ms: u64) -> InboundCall {
        InboundCall {
            ctx: CallContext::new(call_id, CLUSTER_SYNTAX_V3_0, 0, timeout_ms),
            stub: Bytes::new(),
        }
    }
}
