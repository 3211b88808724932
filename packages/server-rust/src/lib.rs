//! `rpcgate` Server: opnum routing, interface contracts and the tower call pipeline.

pub mod interfaces;
pub mod network;
pub mod service;
pub mod telemetry;

#[doc(hidden)]
pub use async_trait::async_trait;

pub use network::{ConnectionId, OutboundPdu, ServerConnection};
pub use service::{
    CallContext, CallDispatcher, CallError, CallReply, Failure, HandlerRegistry, RegisterServer,
    ServerConfig, ServiceError, ServiceResult,
};
