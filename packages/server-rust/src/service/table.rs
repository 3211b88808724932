//! Static opnum tables.
//!
//! Each interface has one table, built at compile time by `rpc_interface!`,
//! where slot `n` describes opnum `n`. A slot is either an operation bound to
//! one contract method, or a reserved opnum that is valid on the wire but
//! never dispatched.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use rpcgate_core::NdrRead;

use super::envelope::{fold_response, Envelope, FromEnvelope, IntoEnvelope, Operation};
use super::operation::{CallContext, Failure, RouteError, ServiceResult};

/// Future produced by a slot once its request has been decoded.
pub type OperationFuture = BoxFuture<'static, Result<Box<dyn Operation>, RouteError>>;

/// Decodes the request synchronously, then returns the contract call as a future.
pub type DispatchFn<S> =
    fn(Arc<S>, CallContext, &mut dyn NdrRead) -> Result<OperationFuture, RouteError>;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// One opnum of an interface.
pub enum Slot<S: ?Sized> {
    Operation {
        name: &'static str,
        dispatch: DispatchFn<S>,
    },
    /// Defined on the wire but never dispatched; routing it is a no-op.
    Reserved { name: &'static str },
}

impl<S: ?Sized> Slot<S> {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Operation { name, .. } | Self::Reserved { name } => *name,
        }
    }

    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved { .. })
    }
}

impl<S: ?Sized> fmt::Debug for Slot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation { name, .. } => f.debug_tuple("Operation").field(name).finish(),
            Self::Reserved { name } => f.debug_tuple("Reserved").field(name).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationTable
// ---------------------------------------------------------------------------

/// Read-only opnum-indexed dispatch table for contract `S`.
pub struct OperationTable<S: ?Sized + 'static> {
    interface: &'static str,
    slots: &'static [Slot<S>],
}

impl<S: ?Sized + 'static> OperationTable<S> {
    #[must_use]
    pub const fn new(interface: &'static str, slots: &'static [Slot<S>]) -> Self {
        Self { interface, slots }
    }

    #[must_use]
    pub const fn interface(&self) -> &'static str {
        self.interface
    }

    /// Looks up the slot for `opnum`. `None` means the opnum is unknown.
    #[must_use]
    pub fn slot(&self, opnum: u16) -> Option<&'static Slot<S>> {
        self.slots.get(usize::from(opnum))
    }

    /// Number of defined opnums, reserved ones included.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn is_reserved(&self, opnum: u16) -> bool {
        self.slot(opnum).is_some_and(Slot::is_reserved)
    }

    #[must_use]
    pub fn operation_name(&self, opnum: u16) -> Option<&'static str> {
        self.slot(opnum).map(Slot::name)
    }

    /// Iterates `(opnum, slot)` pairs in opnum order.
    pub fn slots(&self) -> impl Iterator<Item = (u16, &'static Slot<S>)> {
        let slots: &'static [Slot<S>] = self.slots;
        (0u16..).zip(slots.iter())
    }
}

impl<S: ?Sized + 'static> fmt::Debug for OperationTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTable")
            .field("interface", &self.interface)
            .field("slots", &self.slots)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// decode_and_call
// ---------------------------------------------------------------------------

/// Shared body of every operation slot.
///
/// Decodes a fresh envelope from `reader` and converts it into the typed
/// request. On a decode failure the half-decoded envelope is dropped and
/// `call` is never invoked. Otherwise returns a future that runs `call` and
/// folds its response (or the response attached to its failure) back onto
/// the envelope.
///
/// # Errors
///
/// Returns [`RouteError::Decode`] when the request stub is malformed.
pub fn decode_and_call<Req, Resp, F, Fut>(
    reader: &mut dyn NdrRead,
    call: F,
) -> Result<OperationFuture, RouteError>
where
    Req: FromEnvelope,
    Resp: IntoEnvelope<Envelope = Req::Envelope>,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = ServiceResult<Resp>> + Send + 'static,
{
    let operation = <Req::Envelope as Envelope>::NAME;
    let mut envelope = Req::Envelope::default();
    envelope
        .decode_request(reader)
        .map_err(|source| RouteError::Decode { operation, source })?;

    let request = Req::from_envelope(&envelope);
    let pending = call(request);

    Ok(Box::pin(async move {
        match pending.await {
            Ok(response) => Ok(Box::new(response.into_envelope(envelope)) as Box<dyn Operation>),
            Err(Failure { response, error }) => {
                let response_attached = response.is_some();
                Err(RouteError::Application {
                    operation,
                    envelope: Box::new(fold_response(response, envelope)),
                    response_attached,
                    source: error,
                })
            }
        }
    }))
}

// ---------------------------------------------------------------------------
// Declaration checks
// ---------------------------------------------------------------------------

/// True when `opnums` runs `0, 1, 2, ...` with no gaps. Evaluated at compile
/// time by `rpc_interface!`.
#[doc(hidden)]
#[must_use]
pub const fn opnums_are_dense(opnums: &[usize]) -> bool {
    let mut index = 0;
    while index < opnums.len() {
        if opnums[index] != index {
            return false;
        }
        index += 1;
    }
    true
}

/// True when the slot declared at `opnum` names `method`. Evaluated at
/// compile time by `rpc_interface!`.
#[doc(hidden)]
#[must_use]
pub const fn binds_at(slots: &[&str], opnum: u16, method: &str) -> bool {
    let index = opnum as usize;
    if index >= slots.len() {
        return false;
    }
    let (declared, method) = (slots[index].as_bytes(), method.as_bytes());
    if declared.len() != method.len() {
        return false;
    }
    let mut at = 0;
    while at < declared.len() {
        if declared[at] != method[at] {
            return false;
        }
        at += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{binds_at, opnums_are_dense};
    use crate::interfaces::cluster::CLUSTER_CONTROL_TABLE;

    #[test]
    fn slots_are_indexed_by_opnum() {
        let table = &CLUSTER_CONTROL_TABLE;
        assert_eq!(table.interface(), "ClusterControl");
        assert_eq!(table.len(), 9);
        assert_eq!(table.operation_name(0), Some("OpenCluster"));
        assert_eq!(table.operation_name(8), Some("CloseGroup"));
        assert_eq!(table.operation_name(9), None);
    }

    #[test]
    fn reserved_slots_are_explicit() {
        let table = &CLUSTER_CONTROL_TABLE;
        assert!(table.is_reserved(4));
        assert_eq!(table.operation_name(4), Some("Opnum4NotUsedOnWire"));
        assert!(!table.is_reserved(3));
        assert!(!table.is_reserved(200));

        let reserved: Vec<u16> = table
            .slots()
            .filter(|(_, slot)| slot.is_reserved())
            .map(|(opnum, _)| opnum)
            .collect();
        assert_eq!(reserved, vec![4]);
    }

    #[test]
    fn density_rejects_gaps_and_reordering() {
        assert!(opnums_are_dense(&[]));
        assert!(opnums_are_dense(&[0, 1, 2]));
        assert!(!opnums_are_dense(&[0, 2]));
        assert!(!opnums_are_dense(&[1, 0]));
        assert!(!opnums_are_dense(&[1]));
    }

    #[test]
    fn binding_requires_the_method_at_its_own_opnum() {
        let slots = ["open_cluster", "close_cluster", "reserved"];
        assert!(binds_at(&slots, 0, "open_cluster"));
        assert!(binds_at(&slots, 1, "close_cluster"));
        // Bound, but at the wrong opnum.
        assert!(!binds_at(&slots, 1, "open_cluster"));
        // Prefix of a bound name.
        assert!(!binds_at(&slots, 0, "open"));
        assert!(!binds_at(&slots, 3, "open_group"));
    }

    #[test]
    fn every_operation_slot_carries_its_envelope_name() {
        let names: Vec<&str> = CLUSTER_CONTROL_TABLE
            .slots()
            .filter(|(_, slot)| !slot.is_reserved())
            .map(|(_, slot)| slot.name())
            .collect();
        assert_eq!(
            names,
            [
                "OpenCluster",
                "CloseCluster",
                "SetClusterName",
                "GetClusterName",
                "OpenGroup",
                "SetGroupState",
                "MoveGroup",
                "CloseGroup",
            ]
        );
    }
}
