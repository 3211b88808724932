//! Opnum routing: dispatches one call to the contract method bound to its opnum.

use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use rpcgate_core::NdrRead;

use super::operation::{CallContext, RouteError, RouteResult};
use super::table::{OperationTable, Slot};

/// Future returned by [`InterfaceRouter::route`].
pub type RouteFuture = BoxFuture<'static, RouteResult>;

/// Type-erased router stored by registration and invoked by the transport
/// for every call on the matching syntax.
pub type ServerHandle =
    Arc<dyn Fn(CallContext, u16, &mut dyn NdrRead) -> RouteFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// InterfaceRouter
// ---------------------------------------------------------------------------

/// Binds one contract implementation to its interface's opnum table.
///
/// Holds no per-call state: every `route` is independent, and the only shared
/// data is the immutable table and the implementation itself.
pub struct InterfaceRouter<S: ?Sized + 'static> {
    table: &'static OperationTable<S>,
    service: Arc<S>,
}

impl<S> InterfaceRouter<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(table: &'static OperationTable<S>, service: Arc<S>) -> Self {
        Self { table, service }
    }

    #[must_use]
    pub fn table(&self) -> &'static OperationTable<S> {
        self.table
    }

    /// Routes one call.
    ///
    /// - Unknown opnum: resolves to [`RouteError::UnknownOpnum`].
    /// - Reserved opnum: resolves to `Ok(None)` without reading a byte,
    ///   whatever the stub size.
    /// - A stub longer than `ctx.max_stub_size` resolves to
    ///   [`RouteError::StubTooLarge`] without reading a byte.
    /// - Otherwise the request is decoded before this returns, so `reader` is
    ///   not borrowed by the future. A decode failure resolves to
    ///   [`RouteError::Decode`] without invoking the contract.
    pub fn route(&self, ctx: CallContext, opnum: u16, reader: &mut dyn NdrRead) -> RouteFuture {
        match self.table.slot(opnum) {
            None => future::ready(Err(RouteError::UnknownOpnum {
                interface: self.table.interface(),
                opnum,
            }))
            .boxed(),
            Some(Slot::Reserved { .. }) => future::ready(Ok(None)).boxed(),
            Some(Slot::Operation { name, dispatch }) => {
                let size = reader.remaining();
                if size > ctx.max_stub_size {
                    return future::ready(Err(RouteError::StubTooLarge {
                        operation: *name,
                        size,
                        limit: ctx.max_stub_size,
                    }))
                    .boxed();
                }
                match dispatch(Arc::clone(&self.service), ctx, reader) {
                    Ok(pending) => pending.map(|result| result.map(Some)).boxed(),
                    Err(err) => future::ready(Err(err)).boxed(),
                }
            }
        }
    }

    /// Erases the router into the closure stored by registration.
    #[must_use]
    pub fn into_handle(self) -> ServerHandle {
        Arc::new(
            move |ctx: CallContext, opnum: u16, reader: &mut dyn NdrRead| {
                self.route(ctx, opnum, reader)
            },
        )
    }
}

impl<S: ?Sized + 'static> Clone for InterfaceRouter<S> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            service: Arc::clone(&self.service),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
