use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use rpcgate_core::SyntaxId;

use super::router::{InterfaceRouter, ServerHandle};
use super::table::OperationTable;

// ---------------------------------------------------------------------------
// RegisterServer
// ---------------------------------------------------------------------------

/// Anything a contract implementation can be registered on.
///
/// Implemented by connections and by the bare [`HandlerRegistry`]. Registering
/// a syntax that is already bound replaces the previous handle.
pub trait RegisterServer {
    fn register_server(&self, syntax: SyntaxId, handle: ServerHandle);
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Concurrent map from interface syntax to its registered handle.
///
/// Cloning shares the underlying map, so a dispatcher and the connection that
/// owns it see the same registrations.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handles: Arc<DashMap<SyntaxId, ServerHandle>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handle` to `syntax`. Returns `true` if a previous binding was replaced.
    pub fn insert(&self, syntax: SyntaxId, handle: ServerHandle) -> bool {
        let replaced = self.handles.insert(syntax, handle).is_some();
        tracing::debug!(%syntax, replaced, "interface handler registered");
        replaced
    }

    /// Retrieve the handle registered for `syntax`.
    #[must_use]
    pub fn handle_for(&self, syntax: &SyntaxId) -> Option<ServerHandle> {
        self.handles.get(syntax).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the binding for `syntax`. Returns `true` if one existed.
    pub fn unregister(&self, syntax: &SyntaxId) -> bool {
        self.handles.remove(syntax).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns every registered syntax. Order is unspecified.
    #[must_use]
    pub fn syntaxes(&self) -> Vec<SyntaxId> {
        self.handles.iter().map(|entry| *entry.key()).collect()
    }
}

impl RegisterServer for HandlerRegistry {
    fn register_server(&self, syntax: SyntaxId, handle: ServerHandle) {
        self.insert(syntax, handle);
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("syntaxes", &self.syntaxes())
            .finish()
    }
}

/// Registers `service` for `syntax` on `conn`, routed through `table`.
///
/// `rpc_interface!` generates a typed wrapper that supplies the interface's
/// table and default syntax; call this directly to register another version.
pub fn register<R, S>(conn: &R, table: &'static OperationTable<S>, service: Arc<S>, syntax: SyntaxId)
where
    R: RegisterServer + ?Sized,
    S: ?Sized + Send + Sync + 'static,
{
    conn.register_server(syntax, InterfaceRouter::new(table, service).into_handle());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
