//! Connection-level plumbing between the transport and the call pipeline.

pub mod connection;

pub use connection::{ConnectionId, OutboundPdu, ServerConnection};
