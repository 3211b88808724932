//! Envelopes and typed request/response values for the cluster-control interface.
//!
//! Each `*Operation` holds the union of an opnum's `[in]` and `[out]`
//! parameters. Responses are encoded in declaration order with the return
//! value last.

use rpcgate_core::{ContextHandle, DecodeError, EncodeError, NdrRead, NdrWrite};
use serde::{Deserialize, Serialize};

use crate::service::envelope::{Envelope, FromEnvelope, IntoEnvelope, OperationValue};

/// Binds request and response types to their envelope.
macro_rules! operation_values {
    ($($envelope:ty => $request:ty, $response:ty;)*) => {
        $(
            impl OperationValue for $request {
                type Envelope = $envelope;
            }

            impl OperationValue for $response {
                type Envelope = $envelope;
            }
        )*
    };
}

operation_values! {
    OpenClusterOperation => OpenClusterRequest, OpenClusterResponse;
    CloseClusterOperation => CloseClusterRequest, CloseClusterResponse;
    SetClusterNameOperation => SetClusterNameRequest, SetClusterNameResponse;
    GetClusterNameOperation => GetClusterNameRequest, GetClusterNameResponse;
    OpenGroupOperation => OpenGroupRequest, OpenGroupResponse;
    SetGroupStateOperation => SetGroupStateRequest, SetGroupStateResponse;
    MoveGroupOperation => MoveGroupRequest, MoveGroupResponse;
    CloseGroupOperation => CloseGroupRequest, CloseGroupResponse;
}

// ---------------------------------------------------------------------------
// GroupState
// ---------------------------------------------------------------------------

/// Target state of a group, encoded as a 16-bit enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    #[default]
    Online,
    Offline,
    Failed,
}

impl GroupState {
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidDiscriminant`] for values other than 0, 1 and 2.
    pub fn from_wire(value: u16) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Online),
            1 => Ok(Self::Offline),
            2 => Ok(Self::Failed),
            other => Err(DecodeError::InvalidDiscriminant {
                field: "State",
                value: u32::from(other),
            }),
        }
    }

    #[must_use]
    pub const fn to_wire(self) -> u16 {
        match self {
            Self::Online => 0,
            Self::Offline => 1,
            Self::Failed => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Opnum 0: open_cluster
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct OpenClusterOperation {
    pub status: u32,
    pub cluster: ContextHandle,
}

impl Envelope for OpenClusterOperation {
    const OPNUM: u16 = 0;
    const NAME: &'static str = "OpenCluster";

    fn decode_request(&mut self, _r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_u32(self.status);
        self.cluster.encode(w);
        Ok(())
    }

    fn encode_request(&self, _w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        Ok(())
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.status = r.read_u32()?;
        self.cluster = ContextHandle::decode(r)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenClusterRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenClusterResponse {
    pub status: u32,
    pub cluster: ContextHandle,
}

impl FromEnvelope for OpenClusterRequest {
    fn from_envelope(_envelope: &OpenClusterOperation) -> Self {
        Self
    }
}

impl IntoEnvelope for OpenClusterRequest {
    fn into_envelope(self, envelope: OpenClusterOperation) -> OpenClusterOperation {
        envelope
    }
}

impl FromEnvelope for OpenClusterResponse {
    fn from_envelope(envelope: &OpenClusterOperation) -> Self {
        Self {
            status: envelope.status,
            cluster: envelope.cluster,
        }
    }
}

impl IntoEnvelope for OpenClusterResponse {
    fn into_envelope(self, mut envelope: OpenClusterOperation) -> OpenClusterOperation {
        envelope.status = self.status;
        envelope.cluster = self.cluster;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Opnum 1: close_cluster
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CloseClusterOperation {
    pub cluster: ContextHandle,
    pub return_value: u32,
}

impl Envelope for CloseClusterOperation {
    const OPNUM: u16 = 1;
    const NAME: &'static str = "CloseCluster";

    fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.cluster = ContextHandle::decode(r)?;
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        self.cluster.encode(w);
        w.write_u32(self.return_value);
        Ok(())
    }

    fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        self.cluster.encode(w);
        Ok(())
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.cluster = ContextHandle::decode(r)?;
        self.return_value = r.read_u32()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseClusterRequest {
    pub cluster: ContextHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseClusterResponse {
    /// Null once the server has released the handle.
    pub cluster: ContextHandle,
    pub return_value: u32,
}

impl FromEnvelope for CloseClusterRequest {
    fn from_envelope(envelope: &CloseClusterOperation) -> Self {
        Self {
            cluster: envelope.cluster,
        }
    }
}

impl IntoEnvelope for CloseClusterRequest {
    fn into_envelope(self, mut envelope: CloseClusterOperation) -> CloseClusterOperation {
        envelope.cluster = self.cluster;
        envelope
    }
}

impl FromEnvelope for CloseClusterResponse {
    fn from_envelope(envelope: &CloseClusterOperation) -> Self {
        Self {
            cluster: envelope.cluster,
            return_value: envelope.return_value,
        }
    }
}

impl IntoEnvelope for CloseClusterResponse {
    fn into_envelope(self, mut envelope: CloseClusterOperation) -> CloseClusterOperation {
        envelope.cluster = self.cluster;
        envelope.return_value = self.return_value;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Opnum 2: set_cluster_name
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SetClusterNameOperation {
    pub new_cluster_name: String,
    pub rpc_status: u32,
    pub return_value: u32,
}

impl Envelope for SetClusterNameOperation {
    const OPNUM: u16 = 2;
    const NAME: &'static str = "SetClusterName";

    fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.new_cluster_name = r.read_wide_string("NewClusterName")?;
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_u32(self.rpc_status);
        w.write_u32(self.return_value);
        Ok(())
    }

    fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_wide_string("NewClusterName", &self.new_cluster_name)
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.rpc_status = r.read_u32()?;
        self.return_value = r.read_u32()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetClusterNameRequest {
    pub new_cluster_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetClusterNameResponse {
    pub rpc_status: u32,
    pub return_value: u32,
}

impl FromEnvelope for SetClusterNameRequest {
    fn from_envelope(envelope: &SetClusterNameOperation) -> Self {
        Self {
            new_cluster_name: envelope.new_cluster_name.clone(),
        }
    }
}

impl IntoEnvelope for SetClusterNameRequest {
    fn into_envelope(self, mut envelope: SetClusterNameOperation) -> SetClusterNameOperation {
        envelope.new_cluster_name = self.new_cluster_name;
        envelope
    }
}

impl FromEnvelope for SetClusterNameResponse {
    fn from_envelope(envelope: &SetClusterNameOperation) -> Self {
        Self {
            rpc_status: envelope.rpc_status,
            return_value: envelope.return_value,
        }
    }
}

impl IntoEnvelope for SetClusterNameResponse {
    fn into_envelope(self, mut envelope: SetClusterNameOperation) -> SetClusterNameOperation {
        envelope.rpc_status = self.rpc_status;
        envelope.return_value = self.return_value;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Opnum 3: get_cluster_name
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct GetClusterNameOperation {
    pub cluster_name: Option<String>,
    pub node_name: Option<String>,
    pub return_value: u32,
}

impl Envelope for GetClusterNameOperation {
    const OPNUM: u16 = 3;
    const NAME: &'static str = "GetClusterName";

    fn decode_request(&mut self, _r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_unique_wide_string("ClusterName", self.cluster_name.as_deref())?;
        w.write_unique_wide_string("NodeName", self.node_name.as_deref())?;
        w.write_u32(self.return_value);
        Ok(())
    }

    fn encode_request(&self, _w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        Ok(())
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.cluster_name = r.read_unique_wide_string("ClusterName")?;
        self.node_name = r.read_unique_wide_string("NodeName")?;
        self.return_value = r.read_u32()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetClusterNameRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetClusterNameResponse {
    pub cluster_name: Option<String>,
    pub node_name: Option<String>,
    pub return_value: u32,
}

impl FromEnvelope for GetClusterNameRequest {
    fn from_envelope(_envelope: &GetClusterNameOperation) -> Self {
        Self
    }
}

impl IntoEnvelope for GetClusterNameRequest {
    fn into_envelope(self, envelope: GetClusterNameOperation) -> GetClusterNameOperation {
        envelope
    }
}

impl FromEnvelope for GetClusterNameResponse {
    fn from_envelope(envelope: &GetClusterNameOperation) -> Self {
        Self {
            cluster_name: envelope.cluster_name.clone(),
            node_name: envelope.node_name.clone(),
            return_value: envelope.return_value,
        }
    }
}

impl IntoEnvelope for GetClusterNameResponse {
    fn into_envelope(self, mut envelope: GetClusterNameOperation) -> GetClusterNameOperation {
        envelope.cluster_name = self.cluster_name;
        envelope.node_name = self.node_name;
        envelope.return_value = self.return_value;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Opnum 5: open_group
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct OpenGroupOperation {
    pub group_name: String,
    pub status: u32,
    pub rpc_status: u32,
    pub group: ContextHandle,
}

impl Envelope for OpenGroupOperation {
    const OPNUM: u16 = 5;
    const NAME: &'static str = "OpenGroup";

    fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.group_name = r.read_wide_string("GroupName")?;
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_u32(self.status);
        w.write_u32(self.rpc_status);
        self.group.encode(w);
        Ok(())
    }

    fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_wide_string("GroupName", &self.group_name)
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.status = r.read_u32()?;
        self.rpc_status = r.read_u32()?;
        self.group = ContextHandle::decode(r)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenGroupRequest {
    pub group_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenGroupResponse {
    pub status: u32,
    pub rpc_status: u32,
    pub group: ContextHandle,
}

impl FromEnvelope for OpenGroupRequest {
    fn from_envelope(envelope: &OpenGroupOperation) -> Self {
        Self {
            group_name: envelope.group_name.clone(),
        }
    }
}

impl IntoEnvelope for OpenGroupRequest {
    fn into_envelope(self, mut envelope: OpenGroupOperation) -> OpenGroupOperation {
        envelope.group_name = self.group_name;
        envelope
    }
}

impl FromEnvelope for OpenGroupResponse {
    fn from_envelope(envelope: &OpenGroupOperation) -> Self {
        Self {
            status: envelope.status,
            rpc_status: envelope.rpc_status,
            group: envelope.group,
        }
    }
}

impl IntoEnvelope for OpenGroupResponse {
    fn into_envelope(self, mut envelope: OpenGroupOperation) -> OpenGroupOperation {
        envelope.status = self.status;
        envelope.rpc_status = self.rpc_status;
        envelope.group = self.group;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Opnum 6: set_group_state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SetGroupStateOperation {
    pub group: ContextHandle,
    pub state: GroupState,
    pub return_value: u32,
}

impl Envelope for SetGroupStateOperation {
    const OPNUM: u16 = 6;
    const NAME: &'static str = "SetGroupState";

    fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.group = ContextHandle::decode(r)?;
        self.state = GroupState::from_wire(r.read_u16()?)?;
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_u32(self.return_value);
        Ok(())
    }

    fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        self.group.encode(w);
        w.write_u16(self.state.to_wire());
        Ok(())
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.return_value = r.read_u32()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetGroupStateRequest {
    pub group: ContextHandle,
    pub state: GroupState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetGroupStateResponse {
    pub return_value: u32,
}

impl FromEnvelope for SetGroupStateRequest {
    fn from_envelope(envelope: &SetGroupStateOperation) -> Self {
        Self {
            group: envelope.group,
            state: envelope.state,
        }
    }
}

impl IntoEnvelope for SetGroupStateRequest {
    fn into_envelope(self, mut envelope: SetGroupStateOperation) -> SetGroupStateOperation {
        envelope.group = self.group;
        envelope.state = self.state;
        envelope
    }
}

impl FromEnvelope for SetGroupStateResponse {
    fn from_envelope(envelope: &SetGroupStateOperation) -> Self {
        Self {
            return_value: envelope.return_value,
        }
    }
}

impl IntoEnvelope for SetGroupStateResponse {
    fn into_envelope(self, mut envelope: SetGroupStateOperation) -> SetGroupStateOperation {
        envelope.return_value = self.return_value;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Opnum 7: move_group
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MoveGroupOperation {
    pub group: ContextHandle,
    /// Destination node; `None` lets the cluster pick one.
    pub node: Option<String>,
    pub return_value: u32,
}

impl Envelope for MoveGroupOperation {
    const OPNUM: u16 = 7;
    const NAME: &'static str = "MoveGroup";

    fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.group = ContextHandle::decode(r)?;
        self.node = r.read_unique_wide_string("Node")?;
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        w.write_u32(self.return_value);
        Ok(())
    }

    fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        self.group.encode(w);
        w.write_unique_wide_string("Node", self.node.as_deref())
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.return_value = r.read_u32()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveGroupRequest {
    pub group: ContextHandle,
    pub node: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveGroupResponse {
    pub return_value: u32,
}

impl FromEnvelope for MoveGroupRequest {
    fn from_envelope(envelope: &MoveGroupOperation) -> Self {
        Self {
            group: envelope.group,
            node: envelope.node.clone(),
        }
    }
}

impl IntoEnvelope for MoveGroupRequest {
    fn into_envelope(self, mut envelope: MoveGroupOperation) -> MoveGroupOperation {
        envelope.group = self.group;
        envelope.node = self.node;
        envelope
    }
}

impl FromEnvelope for MoveGroupResponse {
    fn from_envelope(envelope: &MoveGroupOperation) -> Self {
        Self {
            return_value: envelope.return_value,
        }
    }
}

impl IntoEnvelope for MoveGroupResponse {
    fn into_envelope(self, mut envelope: MoveGroupOperation) -> MoveGroupOperation {
        envelope.return_value = self.return_value;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Opnum 8: close_group
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CloseGroupOperation {
    pub group: ContextHandle,
    pub return_value: u32,
}

impl Envelope for CloseGroupOperation {
    const OPNUM: u16 = 8;
    const NAME: &'static str = "CloseGroup";

    fn decode_request(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.group = ContextHandle::decode(r)?;
        Ok(())
    }

    fn encode_response(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        self.group.encode(w);
        w.write_u32(self.return_value);
        Ok(())
    }

    fn encode_request(&self, w: &mut dyn NdrWrite) -> Result<(), EncodeError> {
        self.group.encode(w);
        Ok(())
    }

    fn decode_response(&mut self, r: &mut dyn NdrRead) -> Result<(), DecodeError> {
        self.group = ContextHandle::decode(r)?;
        self.return_value = r.read_u32()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseGroupRequest {
    pub group: ContextHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseGroupResponse {
    pub group: ContextHandle,
    pub return_value: u32,
}

impl FromEnvelope for CloseGroupRequest {
    fn from_envelope(envelope: &CloseGroupOperation) -> Self {
        Self {
            group: envelope.group,
        }
    }
}

impl IntoEnvelope for CloseGroupRequest {
    fn into_envelope(self, mut envelope: CloseGroupOperation) -> CloseGroupOperation {
        envelope.group = self.group;
        envelope
    }
}

impl FromEnvelope for CloseGroupResponse {
    fn from_envelope(envelope: &CloseGroupOperation) -> Self {
        Self {
            group: envelope.group,
            return_value: envelope.return_value,
        }
    }
}

impl IntoEnvelope for CloseGroupResponse {
    fn into_envelope(self, mut envelope: CloseGroupOperation) -> CloseGroupOperation {
        envelope.group = self.group;
        envelope.return_value = self.return_value;
        envelope
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
