//! Interface declaration macro.
//!
//! `rpc_interface!` turns one declaration into everything an interface needs:
//!
//! - the contract trait (object safe via `async_trait`; every method defaults
//!   to `ServiceError::NotImplemented`),
//! - the fallback struct implementing the whole contract with those defaults,
//! - the static opnum table, checked at compile time to be dense and ordered,
//!   with every method bound exactly once, at its envelope's opnum,
//! - a `register_*` function binding an implementation to a connection under
//!   the interface's syntax.
//!
//! ```ignore
//! rpc_interface! {
//!     pub trait ClusterControl {
//!         fn open_cluster(OpenClusterRequest) -> OpenClusterResponse;
//!         fn close_cluster(CloseClusterRequest) -> CloseClusterResponse;
//!     }
//!
//!     pub struct UnimplementedClusterControl;
//!
//!     pub static CLUSTER_CONTROL_TABLE: "ClusterControl" {
//!         0 => open_cluster,
//!         1 => close_cluster,
//!         2 => reserved("Opnum2NotUsedOnWire"),
//!     }
//!
//!     pub fn register_cluster_control = CLUSTER_SYNTAX_V3_0;
//! }
//! ```
//!
//! Slots and failures are named after the envelope (`OpenCluster`), not the
//! method. Binding a method at an opnum its envelope does not carry fails to
//! compile:
//!
//! ```compile_fail
//! use rpcgate_server::interfaces::cluster::{
//!     CloseClusterRequest, CloseClusterResponse, OpenClusterRequest, OpenClusterResponse,
//!     CLUSTER_SYNTAX_V3_0,
//! };
//!
//! rpcgate_server::rpc_interface! {
//!     pub trait Misbound {
//!         fn open_cluster(OpenClusterRequest) -> OpenClusterResponse;
//!         fn close_cluster(CloseClusterRequest) -> CloseClusterResponse;
//!     }
//!
//!     pub struct UnimplementedMisbound;
//!
//!     pub static MISBOUND_TABLE: "Misbound" {
//!         0 => close_cluster,
//!         1 => open_cluster,
//!     }
//!
//!     pub fn register_misbound = CLUSTER_SYNTAX_V3_0;
//! }
//!
//! fn main() {}
//! ```
//!
//! So does leaving a method out of the table:
//!
//! ```compile_fail
//! use rpcgate_server::interfaces::cluster::{
//!     CloseClusterRequest, CloseClusterResponse, OpenClusterRequest, OpenClusterResponse,
//!     CLUSTER_SYNTAX_V3_0,
//! };
//!
//! rpcgate_server::rpc_interface! {
//!     pub trait Unbound {
//!         fn open_cluster(OpenClusterRequest) -> OpenClusterResponse;
//!         fn close_cluster(CloseClusterRequest) -> CloseClusterResponse;
//!     }
//!
//!     pub struct UnimplementedUnbound;
//!
//!     pub static UNBOUND_TABLE: "Unbound" {
//!         0 => open_cluster,
//!         1 => reserved("Opnum1NotUsedOnWire"),
//!     }
//!
//!     pub fn register_unbound = CLUSTER_SYNTAX_V3_0;
//! }
//!
//! fn main() {}
//! ```
//!
//! The same declaration with the table fixed compiles:
//!
//! ```
//! use rpcgate_server::interfaces::cluster::{
//!     CloseClusterRequest, CloseClusterResponse, OpenClusterRequest, OpenClusterResponse,
//!     CLUSTER_SYNTAX_V3_0,
//! };
//!
//! rpcgate_server::rpc_interface! {
//!     pub trait Bound {
//!         fn open_cluster(OpenClusterRequest) -> OpenClusterResponse;
//!         fn close_cluster(CloseClusterRequest) -> CloseClusterResponse;
//!     }
//!
//!     pub struct UnimplementedBound;
//!
//!     pub static BOUND_TABLE: "Bound" {
//!         0 => open_cluster,
//!         1 => close_cluster,
//!     }
//!
//!     pub fn register_bound = CLUSTER_SYNTAX_V3_0;
//! }
//!
//! assert_eq!(BOUND_TABLE.operation_name(1), Some("CloseCluster"));
//! ```

/// Declares an RPC interface. See the [module docs](crate::service::contract).
#[macro_export]
macro_rules! rpc_interface {
    (
        $(#[$trait_meta:meta])*
        $trait_vis:vis trait $trait:ident {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident($request:ty) -> $response:ty;
            )*
        }

        $(#[$fallback_meta:meta])*
        $fallback_vis:vis struct $fallback:ident;

        $(#[$table_meta:meta])*
        $table_vis:vis static $table:ident: $interface:literal {
            $( $opnum:literal => $slot:ident $( ( $reserved:literal ) )? ),* $(,)?
        }

        $(#[$register_meta:meta])*
        $register_vis:vis fn $register:ident = $syntax:path;
    ) => {
        $(#[$trait_meta])*
        #[$crate::async_trait]
        $trait_vis trait $trait: Send + Sync {
            $(
                $(#[$method_meta])*
                async fn $method(
                    &self,
                    _ctx: &$crate::service::operation::CallContext,
                    _request: $request,
                ) -> $crate::service::operation::ServiceResult<$response> {
                    Err($crate::service::operation::ServiceError::not_implemented(
                        <<$request as $crate::service::envelope::OperationValue>::Envelope
                            as $crate::service::envelope::Envelope>::NAME,
                    )
                    .into())
                }
            )*
        }

        $(#[$fallback_meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $fallback_vis struct $fallback;

        impl $trait for $fallback {}

        $(#[$table_meta])*
        $table_vis static $table: $crate::service::table::OperationTable<dyn $trait> = {
            $(
                #[allow(non_upper_case_globals)]
                const $method: &str = <<$request as $crate::service::envelope::OperationValue>::Envelope
                    as $crate::service::envelope::Envelope>::NAME;
            )*
            static SLOTS: &[$crate::service::table::Slot<dyn $trait>] =
                &[ $( $crate::__rpc_slot!($trait; $slot $( ($reserved) )?) ),* ];
            $crate::service::table::OperationTable::<dyn $trait>::new($interface, SLOTS)
        };

        const _: () = {
            assert!(
                $crate::service::table::opnums_are_dense(&[ $( $opnum ),* ]),
                "opnums must start at 0 and have no gaps; declare unused opnums as reserved"
            );
            $(
                #[allow(non_upper_case_globals)]
                const $method: u16 = <<$request as $crate::service::envelope::OperationValue>::Envelope
                    as $crate::service::envelope::Envelope>::OPNUM;
            )*
            $(
                assert!(
                    $crate::__rpc_slot_matches!($slot $( ($reserved) )?; $opnum),
                    "a slot is bound to a method whose envelope carries another opnum"
                );
            )*
            const __RPC_SLOT_NAMES: &[&str] = &[ $( stringify!($slot) ),* ];
            $(
                assert!(
                    $crate::service::table::binds_at(__RPC_SLOT_NAMES, $method, stringify!($method)),
                    "every contract method must be bound once, at its envelope's opnum"
                );
            )*
        };

        $(#[$register_meta])*
        $register_vis fn $register<R>(conn: &R, server: ::std::sync::Arc<dyn $trait>)
        where
            R: $crate::service::registry::RegisterServer + ?Sized,
        {
            $crate::service::registry::register(conn, &$table, server, $syntax);
        }
    };
}

/// One table slot. Implementation detail of `rpc_interface!`.
#[doc(hidden)]
#[macro_export]
macro_rules! __rpc_slot {
    ($trait:ident; reserved ($name:literal)) => {
        $crate::service::table::Slot::<dyn $trait>::Reserved { name: $name }
    };
    ($trait:ident; $method:ident) => {
        $crate::service::table::Slot::<dyn $trait>::Operation {
            name: $method,
            dispatch: |service, ctx, reader| {
                $crate::service::table::decode_and_call(reader, move |request| async move {
                    service.$method(&ctx, request).await
                })
            },
        }
    };
}

/// Whether one table slot agrees with its envelope's opnum. Implementation
/// detail of `rpc_interface!`.
#[doc(hidden)]
#[macro_export]
macro_rules! __rpc_slot_matches {
    (reserved ($name:literal); $opnum:literal) => {
        true
    };
    ($method:ident; $opnum:literal) => {
        $method == $opnum
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rpcgate_core::{ContextHandle, DecodeError, NdrRead, NdrReader, NdrWrite, SyntaxId};
    use rpcgate_core::{EncodeError, NdrWriter};
    use uuid::Uuid;

    use crate::service::envelope::{Envelope, FromEnvelope, IntoEnvelope, OperationValue};
    use crate::service::operation::{CallContext, RouteError, ServiceError, ServiceResult};
    use crate::service::registry::HandlerRegistry;

    const PING_SYNTAX: SyntaxId = SyntaxId::new(Uuid::from_u128(0xfeed), 1, 0);

    #[derive(Debug, Default)]
    struct PingOperation {
        token: u32,
        handle: ContextHandle,
    }

    impl Envelope for PingOperation {
        const OPNUM: u16 = 1;
        const NAME: &'static str = "Ping";

        fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
            self.token = r.read_u32()?;
            Ok(())
        }

        fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
            self.handle.encode(w);
            Ok(())
        }

        fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
            w.write_u32(self.token);
            Ok(())
        }

        fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
            self.handle = ContextHandle::decode(r)?;
            Ok(())
        }
    }

    struct PingRequest(u32);
    struct PingResponse(ContextHandle);

    impl OperationValue for PingRequest {
        type Envelope = PingOperation;
    }

    impl OperationValue for PingResponse {
        type Envelope = PingOperation;
    }

    impl FromEnvelope for PingRequest {
        fn from_envelope(envelope: &PingOperation) -> Self {
            Self(envelope.token)
        }
    }

    impl IntoEnvelope for PingResponse {
        fn into_envelope(self, mut envelope: PingOperation) -> PingOperation {
            envelope.handle = self.0;
            envelope
        }
    }

    rpc_interface! {
        /// Test contract with a reserved opnum 0.
        trait Ping {
            fn ping(PingRequest) -> PingResponse;
        }

        struct UnimplementedPing;

        static PING_TABLE: "Ping" {
            0 => reserved("Opnum0NotUsedOnWire"),
            1 => ping,
        }

        fn register_ping = PING_SYNTAX;
    }

    struct Echo;

    #[crate::async_trait]
    impl Ping for Echo {
        async fn ping(&self, ctx: &CallContext, request: PingRequest) -> ServiceResult<PingResponse> {
            let uuid = Uuid::from_u128(u128::from(request.0) + u128::from(ctx.opnum));
            Ok(PingResponse(ContextHandle::new(uuid)))
        }
    }

    fn ping_stub(token: u32) -> NdrReader {
        let mut w = NdrWriter::new();
        w.write_u32(token);
        NdrReader::new(w.freeze())
    }

    #[tokio::test]
    async fn generated_table_routes_to_the_implementation() {
        let registry = HandlerRegistry::new();
        register_ping(&registry, Arc::new(Echo));

        let handle = registry.handle_for(&PING_SYNTAX).unwrap();
        let ctx = CallContext::new(1, PING_SYNTAX, 1, 1000);
        let op = handle(ctx, 1, &mut ping_stub(40)).await.unwrap().unwrap();

        let envelope = op.downcast_ref::<PingOperation>().unwrap();
        assert_eq!(envelope.handle.uuid, Uuid::from_u128(41));
        assert_eq!(envelope.token, 40);
    }

    #[tokio::test]
    async fn generated_fallback_is_not_implemented() {
        let registry = HandlerRegistry::new();
        register_ping(&registry, Arc::new(UnimplementedPing));

        let handle = registry.handle_for(&PING_SYNTAX).unwrap();
        let ctx = CallContext::new(1, PING_SYNTAX, 1, 1000);
        let err = handle(ctx, 1, &mut ping_stub(0)).await.unwrap_err();

        assert!(matches!(
            err,
            RouteError::Application {
                source: ServiceError::NotImplemented { operation: "Ping" },
                response_attached: false,
                ..
            }
        ));
    }

    #[test]
    fn generated_table_keeps_reserved_slots() {
        assert_eq!(PING_TABLE.len(), 2);
        assert!(PING_TABLE.is_reserved(0));
        assert_eq!(PING_TABLE.operation_name(1), Some("Ping"));
    }

    #[test]
    fn response_round_trips_through_the_client_side() {
        let envelope = PingResponse(ContextHandle::new(Uuid::from_u128(9)))
            .into_envelope(PingOperation::default());
        let mut w = NdrWriter::new();
        envelope.encode_response(&mut w).unwrap();

        let mut client = PingOperation::default();
        client.decode_response(&mut NdrReader::new(w.freeze())).unwrap();
        assert_eq!(client.handle, envelope.handle);
    }
}
