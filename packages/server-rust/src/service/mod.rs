//! Opnum routing and call execution framework.
//!
//! This module implements the call pipeline:
//!
//! 1. **Envelopes** (`envelope`): per-opnum wire values and typed converters
//! 2. **Tables** (`table`): static opnum-indexed slots, operation or reserved
//! 3. **Routing** (`router`): opnum -> decode -> contract method -> envelope
//! 4. **Contracts** (`contract`): `rpc_interface!` declares trait, fallback and table
//! 5. **Registration** (`registry`): syntax -> router handle
//! 6. **Dispatch** (`dispatch`): stub in, response stub or typed failure out
//! 7. **Middleware** (`middleware`): Tower layers (timeout, metrics, load-shedding)

pub mod config;
pub mod contract;
pub mod dispatch;
pub mod envelope;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod table;

// Re-export key types for convenient access.
pub use config::ServerConfig;
pub use dispatch::{CallDispatcher, CallError, CallReply, InboundCall};
pub use envelope::{Envelope, FromEnvelope, IntoEnvelope, Operation, OperationValue};
pub use operation::{
    CallContext, Failure, RouteError, RouteResult, ServiceError, ServiceResult,
};
pub use registry::{register, HandlerRegistry, RegisterServer};
pub use router::{InterfaceRouter, RouteFuture, ServerHandle};
pub use table::{OperationTable, Slot};
