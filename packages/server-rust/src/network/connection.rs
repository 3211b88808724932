//! Server side of one RPC connection.
//!
//! Holds the presentation contexts negotiated at bind time, the interfaces
//! registered on the connection and the call pipeline that serves them.
//! `handle_request` turns a request PDU body into the body of the PDU to
//! send back, if any.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use rpcgate_core::pdu::response_body;
use rpcgate_core::{FaultHeader, FaultStatus, NdrReader, RequestHeader, SyntaxId};
use tower::ServiceExt;

use crate::service::config::ServerConfig;
use crate::service::dispatch::{CallDispatcher, CallError, CallReply, InboundCall};
use crate::service::middleware::{build_call_pipeline, CallPipeline};
use crate::service::operation::CallContext;
use crate::service::registry::{HandlerRegistry, RegisterServer};
use crate::service::router::ServerHandle;

/// Unique identifier for a connection, assigned by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Body of the PDU to send in answer to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPdu {
    /// Response body: header followed by the response stub.
    Response(Bytes),
    /// Fault body carrying `status`.
    Fault { status: FaultStatus, body: Bytes },
    /// Nothing goes back on the wire.
    Silent,
}

impl OutboundPdu {
    fn fault(context_id: u16, status: FaultStatus) -> Self {
        Self::Fault {
            status,
            body: FaultHeader::new(context_id, status).to_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConnection
// ---------------------------------------------------------------------------

/// Per-connection state shared by every call on the connection.
pub struct ServerConnection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    contexts: DashMap<u16, SyntaxId>,
    registry: HandlerRegistry,
    pipeline: Mutex<CallPipeline>,
    next_call_id: AtomicU64,
    config: Arc<ServerConfig>,
}

impl ServerConnection {
    /// Creates a connection with no bound contexts and no registered interfaces.
    #[must_use]
    pub fn new(id: ConnectionId, config: Arc<ServerConfig>) -> Self {
        let registry = HandlerRegistry::new();
        let dispatcher = CallDispatcher::new(registry.clone(), config.max_stub_size);
        let pipeline = build_call_pipeline(dispatcher, &config);
        Self {
            id,
            peer: None,
            contexts: DashMap::new(),
            registry,
            pipeline: Mutex::new(pipeline),
            next_call_id: AtomicU64::new(1),
            config,
        }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Accepts presentation context `context_id` for `syntax`.
    ///
    /// Rebinding an id replaces its syntax. Whether an implementation is
    /// registered for `syntax` is checked per call, not here.
    pub fn bind_context(&self, context_id: u16, syntax: SyntaxId) {
        tracing::debug!(connection_id = self.id.0, context_id, %syntax, "context bound");
        self.contexts.insert(context_id, syntax);
    }

    /// Drops presentation context `context_id`. Returns its syntax if it was bound.
    pub fn release_context(&self, context_id: u16) -> Option<SyntaxId> {
        self.contexts.remove(&context_id).map(|(_, syntax)| syntax)
    }

    #[must_use]
    pub fn syntax_for(&self, context_id: u16) -> Option<SyntaxId> {
        self.contexts.get(&context_id).map(|entry| *entry.value())
    }

    /// Runs one call through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the [`CallError`] produced by the pipeline.
    pub async fn call(&self, ctx: CallContext, stub: Bytes) -> Result<CallReply, CallError> {
        let pipeline = self.pipeline.lock().clone();
        pipeline.oneshot(InboundCall { ctx, stub }).await
    }

    /// Handles one request PDU body.
    ///
    /// `object_present` mirrors the object-UUID flag of the PDU header.
    pub async fn handle_request(&self, object_present: bool, body: Bytes) -> OutboundPdu {
        let mut reader = NdrReader::new(body);
        let header = match RequestHeader::decode(&mut reader, object_present) {
            Ok(header) => header,
            Err(error) => {
                tracing::warn!(connection_id = self.id.0, %error, "malformed request header");
                return OutboundPdu::fault(0, FaultStatus::PROTOCOL_ERROR);
            }
        };

        let context_id = header.context_id;
        let Some(syntax) = self.syntax_for(context_id) else {
            tracing::warn!(
                connection_id = self.id.0,
                context_id,
                "request on unbound presentation context"
            );
            return OutboundPdu::fault(context_id, FaultStatus::UNKNOWN_INTERFACE);
        };

        let mut ctx = CallContext::new(
            self.next_call_id.fetch_add(1, Ordering::Relaxed),
            syntax,
            header.opnum,
            self.config.default_call_timeout_ms,
        );
        ctx.connection_id = self.id.0;
        ctx.context_id = context_id;
        ctx.object = header.object;
        ctx.peer = self.peer;
        let call_id = ctx.call_id;

        match self.call(ctx, reader.into_remaining()).await {
            Ok(CallReply::Response(stub)) => {
                OutboundPdu::Response(response_body(context_id, &stub))
            }
            Ok(CallReply::Inert) => OutboundPdu::Silent,
            Err(CallError::Application {
                operation,
                stub: Some(stub),
                source,
            }) => {
                tracing::warn!(
                    connection_id = self.id.0,
                    call_id,
                    operation,
                    error = %source,
                    "call failed, returning its response"
                );
                OutboundPdu::Response(response_body(context_id, &stub))
            }
            Err(error) => {
                let status = error.fault_status();
                tracing::warn!(
                    connection_id = self.id.0,
                    call_id,
                    %error,
                    %status,
                    "call faulted"
                );
                OutboundPdu::fault(context_id, status)
            }
        }
    }
}

impl RegisterServer for ServerConnection {
    fn register_server(&self, syntax: SyntaxId, handle: ServerHandle) {
        self.registry.insert(syntax, handle);
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("contexts", &self.contexts.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use rpcgate_core::{ContextHandle, NdrWrite, NdrWriter, ResponseHeader};
    use uuid::Uuid;

    use super::*;
    use crate::interfaces::cluster::*;
    use crate::service::envelope::{Envelope, FromEnvelope, IntoEnvelope};
    use crate::service::operation::{Failure, ServiceError, ServiceResult};

    const CONTEXT: u16 = 3;

    #[derive(Default)]
    struct Recorder {
        objects: parking_lot::Mutex<Vec<Option<Uuid>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClusterControl for Recorder {
        async fn open_cluster(
            &self,
            ctx: &CallContext,
            _request: OpenClusterRequest,
        ) -> ServiceResult<OpenClusterResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.objects.lock().push(ctx.object);
            Ok(OpenClusterResponse {
                status: 0,
                cluster: ContextHandle::new(Uuid::from_u128(u128::from(ctx.call_id))),
            })
        }

        async fn set_cluster_name(
            &self,
            _ctx: &CallContext,
            _request: SetClusterNameRequest,
        ) -> ServiceResult<SetClusterNameResponse> {
            Err(Failure::with_response(
                SetClusterNameResponse {
                    rpc_status: 5,
                    return_value: 5,
                },
                ServiceError::Fault {
                    status: FaultStatus::ACCESS_DENIED,
                },
            ))
        }
    }

    fn connection(service: Arc<dyn ClusterControl>) -> ServerConnection {
        let conn = ServerConnection::new(ConnectionId(9), Arc::new(ServerConfig::default()));
        register_cluster_control(&conn, service);
        conn.bind_context(CONTEXT, CLUSTER_SYNTAX_V3_0);
        conn
    }

    fn request_body(context_id: u16, opnum: u16, object: Option<Uuid>, stub: &[u8]) -> Bytes {
        let mut w = NdrWriter::new();
        RequestHeader {
            alloc_hint: u32::try_from(stub.len()).unwrap(),
            context_id,
            opnum,
            object,
        }
        .encode(&mut w);
        w.write_bytes(stub);
        w.freeze()
    }

    fn set_name_stub(name: &str) -> Bytes {
        let envelope = SetClusterNameRequest {
            new_cluster_name: name.into(),
        }
        .into_envelope(SetClusterNameOperation::default());
        let mut w = NdrWriter::new();
        envelope.encode_request(&mut w).unwrap();
        w.freeze()
    }

    fn response_of<R: FromEnvelope>(pdu: OutboundPdu) -> R {
        let OutboundPdu::Response(body) = pdu else {
            panic!("expected a response, got {pdu:?}");
        };
        let mut r = NdrReader::new(body);
        let header = ResponseHeader::decode(&mut r).unwrap();
        assert_eq!(header.context_id, CONTEXT);
        let mut envelope = R::Envelope::default();
        envelope.decode_response(&mut r).unwrap();
        R::from_envelope(&envelope)
    }

    #[tokio::test]
    async fn request_is_answered_with_a_response_body() {
        let conn = connection(Arc::new(Recorder::default()));
        let object = Uuid::from_u128(77);

        let pdu = conn
            .handle_request(true, request_body(CONTEXT, 0, Some(object), &[]))
            .await;

        let response: OpenClusterResponse = response_of(pdu);
        assert_eq!(response.cluster, ContextHandle::new(Uuid::from_u128(1)));
    }

    #[tokio::test]
    async fn call_context_carries_the_object_uuid() {
        let service = Arc::new(Recorder::default());
        let conn = connection(service.clone());
        let object = Uuid::from_u128(77);

        conn.handle_request(true, request_body(CONTEXT, 0, Some(object), &[]))
            .await;
        conn.handle_request(false, request_body(CONTEXT, 0, None, &[]))
            .await;

        assert_eq!(*service.objects.lock(), vec![Some(object), None]);
    }

    #[tokio::test]
    async fn call_ids_increase_per_connection() {
        let conn = connection(Arc::new(Recorder::default()));
        let first: OpenClusterResponse = response_of(
            conn.handle_request(false, request_body(CONTEXT, 0, None, &[]))
                .await,
        );
        let second: OpenClusterResponse = response_of(
            conn.handle_request(false, request_body(CONTEXT, 0, None, &[]))
                .await,
        );
        assert_eq!(first.cluster.uuid, Uuid::from_u128(1));
        assert_eq!(second.cluster.uuid, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn reserved_opnum_sends_nothing() {
        let service = Arc::new(Recorder::default());
        let conn = connection(service.clone());

        let pdu = conn
            .handle_request(false, request_body(CONTEXT, 4, None, &[]))
            .await;

        assert_eq!(pdu, OutboundPdu::Silent);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_opnum_faults_with_op_range_error() {
        let conn = connection(Arc::new(Recorder::default()));
        let pdu = conn
            .handle_request(false, request_body(CONTEXT, 40, None, &[]))
            .await;

        let OutboundPdu::Fault { status, body } = pdu else {
            panic!("expected a fault, got {pdu:?}");
        };
        assert_eq!(status, FaultStatus::OP_RNG_ERROR);
        let header = FaultHeader::decode(&mut NdrReader::new(body)).unwrap();
        assert_eq!(header, FaultHeader::new(CONTEXT, FaultStatus::OP_RNG_ERROR));
    }

    #[tokio::test]
    async fn unbound_context_faults_with_unknown_interface() {
        let conn = connection(Arc::new(Recorder::default()));
        let pdu = conn
            .handle_request(false, request_body(CONTEXT + 1, 0, None, &[]))
            .await;
        assert!(matches!(
            pdu,
            OutboundPdu::Fault {
                status: FaultStatus::UNKNOWN_INTERFACE,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn released_context_stops_routing() {
        let conn = connection(Arc::new(Recorder::default()));
        assert_eq!(conn.release_context(CONTEXT), Some(CLUSTER_SYNTAX_V3_0));
        assert_eq!(conn.syntax_for(CONTEXT), None);

        let pdu = conn
            .handle_request(false, request_body(CONTEXT, 0, None, &[]))
            .await;
        assert!(matches!(
            pdu,
            OutboundPdu::Fault {
                status: FaultStatus::UNKNOWN_INTERFACE,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn bound_context_without_registration_faults() {
        let conn = connection(Arc::new(Recorder::default()));
        conn.bind_context(CONTEXT, CLUSTER_SYNTAX_V3_0.with_version(2, 0));

        let pdu = conn
            .handle_request(false, request_body(CONTEXT, 0, None, &[]))
            .await;
        assert!(matches!(
            pdu,
            OutboundPdu::Fault {
                status: FaultStatus::UNKNOWN_INTERFACE,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn truncated_header_is_a_protocol_error() {
        let conn = connection(Arc::new(Recorder::default()));
        let pdu = conn
            .handle_request(false, Bytes::from_static(&[1, 0, 0]))
            .await;
        assert!(matches!(
            pdu,
            OutboundPdu::Fault {
                status: FaultStatus::PROTOCOL_ERROR,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn malformed_stub_faults_with_bad_stub_data() {
        let conn = connection(Arc::new(Recorder::default()));
        let stub = set_name_stub("prod");

        let pdu = conn
            .handle_request(
                false,
                request_body(CONTEXT, 2, None, &stub[..stub.len() - 3]),
            )
            .await;
        assert!(matches!(
            pdu,
            OutboundPdu::Fault {
                status: FaultStatus::BAD_STUB_DATA,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failure_with_response_is_sent_as_a_response() {
        let conn = connection(Arc::new(Recorder::default()));
        let pdu = conn
            .handle_request(false, request_body(CONTEXT, 2, None, &set_name_stub("prod")))
            .await;

        let response: SetClusterNameResponse = response_of(pdu);
        assert_eq!(
            response,
            SetClusterNameResponse {
                rpc_status: 5,
                return_value: 5
            }
        );
    }

    #[tokio::test]
    async fn failure_without_response_is_a_fault() {
        let conn = connection(Arc::new(UnimplementedClusterControl));
        let pdu = conn
            .handle_request(false, request_body(CONTEXT, 0, None, &[]))
            .await;
        assert!(matches!(
            pdu,
            OutboundPdu::Fault {
                status: FaultStatus::CANNOT_SUPPORT,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn reregistering_replaces_the_implementation() {
        let conn = connection(Arc::new(UnimplementedClusterControl));
        register_cluster_control(&conn, Arc::new(Recorder::default()));

        let pdu = conn
            .handle_request(false, request_body(CONTEXT, 0, None, &[]))
            .await;
        assert!(matches!(pdu, OutboundPdu::Response(_)));
        assert_eq!(conn.registry().len(), 1);
    }
}
