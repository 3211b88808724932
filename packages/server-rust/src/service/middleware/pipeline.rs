//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::ServerConfig;
use crate::service::dispatch::{CallDispatcher, CallError, CallReply, InboundCall};

/// Type-erased call pipeline as held by a connection.
pub type CallPipeline = BoxCloneService<InboundCall, CallReply, CallError>;

/// Build the call pipeline by wrapping the `CallDispatcher` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce per-call timeouts
/// 3. `MetricsLayer` -- record timing and outcome (closest to the actual handler)
#[must_use]
pub fn build_call_pipeline(dispatcher: CallDispatcher, config: &ServerConfig) -> CallPipeline {
    BoxCloneService::new(
        ServiceBuilder::new()
            .layer(LoadShedLayer::new(config.max_concurrent_calls))
            .layer(TimeoutLayer)
            .layer(MetricsLayer)
            .service(dispatcher),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tower::ServiceExt;

    use super::*;
    use crate::interfaces::cluster::{
        register_cluster_control, ClusterControl, GetClusterNameRequest, GetClusterNameResponse,
        CLUSTER_SYNTAX_V3_0,
    };
    use crate::service::operation::{CallContext, ServiceError, ServiceResult};
    use crate::service::registry::HandlerRegistry;

    /// Never finishes unless cancelled.
    struct Stuck;

    #[async_trait]
    impl ClusterControl for Stuck {
        async fn get_cluster_name(
            &self,
            ctx: &CallContext,
            _request: GetClusterNameRequest,
        ) -> ServiceResult<GetClusterNameResponse> {
            ctx.cancellation.cancelled().await;
            Err(ServiceError::Cancelled.into())
        }
    }

    fn pipeline(config: &ServerConfig) -> CallPipeline {
        let registry = HandlerRegistry::new();
        register_cluster_control(&registry, Arc::new(Stuck));
        build_call_pipeline(CallDispatcher::new(registry, config.max_stub_size), config)
    }

    fn call(opnum: u16, timeout_ms: u64) -> InboundCall {
        InboundCall {
            ctx: CallContext::new(1, CLUSTER_SYNTAX_V3_0, opnum, timeout_ms),
            stub: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let svc = pipeline(&ServerConfig::default());
        let reply = svc.oneshot(call(4, 5000)).await.unwrap();
        assert_eq!(reply, CallReply::Inert);
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_times_out_stuck_handlers() {
        let svc = pipeline(&ServerConfig::default());
        let inbound = call(3, 100);
        let token = inbound.ctx.cancellation.clone();

        let err = svc.oneshot(inbound).await.unwrap_err();
        assert!(matches!(err, CallError::Timeout { timeout_ms: 100 }));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn pipeline_sheds_beyond_the_concurrency_limit() {
        let config = ServerConfig {
            max_concurrent_calls: 1,
            ..ServerConfig::default()
        };
        let svc = pipeline(&config);

        let first = call(3, 60_000);
        let token = first.ctx.cancellation.clone();
        let in_flight = tokio::spawn(svc.clone().oneshot(first));
        tokio::task::yield_now().await;

        let err = svc.clone().oneshot(call(3, 60_000)).await.unwrap_err();
        assert!(matches!(err, CallError::Overloaded));

        token.cancel();
        let first = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(
            first,
            CallError::Application {
                source: ServiceError::Cancelled,
                ..
            }
        ));
    }
}
