//! Interfaces served by rpcgate.

pub mod cluster;
