//! Cluster-control interface, version 3.0.
//!
//! Opnum 4 is a retired slot that stays in the table so later opnums keep
//! their positions.

pub mod operations;

use rpcgate_core::SyntaxId;
use uuid::Uuid;

pub use operations::*;

/// Abstract syntax the cluster-control interface registers under.
pub const CLUSTER_SYNTAX_V3_0: SyntaxId = SyntaxId::new(
    Uuid::from_u128(0xb97d_b8b2_4c63_11cf_bff6_0800_2be2_3f2f),
    3,
    0,
);

crate::rpc_interface! {
    /// Server contract for cluster control.
    pub trait ClusterControl {
        /// Opens a session handle to the cluster.
        fn open_cluster(OpenClusterRequest) -> OpenClusterResponse;
        /// Releases a cluster handle; the response carries the nulled handle.
        fn close_cluster(CloseClusterRequest) -> CloseClusterResponse;
        fn set_cluster_name(SetClusterNameRequest) -> SetClusterNameResponse;
        fn get_cluster_name(GetClusterNameRequest) -> GetClusterNameResponse;
        fn open_group(OpenGroupRequest) -> OpenGroupResponse;
        fn set_group_state(SetGroupStateRequest) -> SetGroupStateResponse;
        /// Moves a group to `node`, or to a node of the cluster's choosing.
        fn move_group(MoveGroupRequest) -> MoveGroupResponse;
        fn close_group(CloseGroupRequest) -> CloseGroupResponse;
    }

    /// Answers every cluster-control call with `NotImplemented`.
    pub struct UnimplementedClusterControl;

    pub static CLUSTER_CONTROL_TABLE: "ClusterControl" {
        0 => open_cluster,
        1 => close_cluster,
        2 => set_cluster_name,
        3 => get_cluster_name,
        4 => reserved("Opnum4NotUsedOnWire"),
        5 => open_group,
        6 => set_group_state,
        7 => move_group,
        8 => close_group,
    }

    /// Binds a cluster-control implementation under [`CLUSTER_SYNTAX_V3_0`].
    pub fn register_cluster_control = CLUSTER_SYNTAX_V3_0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::envelope::Envelope;

    #[test]
    fn table_positions_match_envelope_opnums() {
        let positions = [
            (OpenClusterOperation::OPNUM, OpenClusterOperation::NAME),
            (CloseClusterOperation::OPNUM, CloseClusterOperation::NAME),
            (SetClusterNameOperation::OPNUM, SetClusterNameOperation::NAME),
            (GetClusterNameOperation::OPNUM, GetClusterNameOperation::NAME),
            (OpenGroupOperation::OPNUM, OpenGroupOperation::NAME),
            (SetGroupStateOperation::OPNUM, SetGroupStateOperation::NAME),
            (MoveGroupOperation::OPNUM, MoveGroupOperation::NAME),
            (CloseGroupOperation::OPNUM, CloseGroupOperation::NAME),
        ];
        for (opnum, name) in positions {
            assert_eq!(CLUSTER_CONTROL_TABLE.operation_name(opnum), Some(name));
        }
    }

    #[tokio::test]
    async fn fallback_failures_use_the_slot_name() {
        use std::sync::Arc;

        use rpcgate_core::NdrReader;

        use crate::service::operation::{CallContext, RouteError, ServiceError};
        use crate::service::registry::HandlerRegistry;

        let registry = HandlerRegistry::new();
        register_cluster_control(&registry, Arc::new(UnimplementedClusterControl));
        let handle = registry.handle_for(&CLUSTER_SYNTAX_V3_0).unwrap();

        // GetClusterName takes no inputs, so an empty stub decodes.
        let opnum = GetClusterNameOperation::OPNUM;
        let ctx = CallContext::new(1, CLUSTER_SYNTAX_V3_0, opnum, 1000);
        let err = handle(ctx, opnum, &mut NdrReader::new(Vec::new()))
            .await
            .unwrap_err();

        let slot_name = CLUSTER_CONTROL_TABLE.operation_name(opnum).unwrap();
        match err {
            RouteError::Application {
                operation,
                source: ServiceError::NotImplemented { operation: failed },
                ..
            } => {
                assert_eq!(operation, slot_name);
                assert_eq!(failed, slot_name);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn syntax_displays_version() {
        assert_eq!(
            CLUSTER_SYNTAX_V3_0.to_string(),
            "b97db8b2-4c63-11cf-bff6-08002be23f2f v3.0"
        );
    }
}
