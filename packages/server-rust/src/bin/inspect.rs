//! Feeds one captured request stub through a cluster-control connection and
//! prints the outcome as a JSON line.
//!
//! The interface is served by its fallback implementation, so a well-formed
//! stub for a routable opnum answers `cannot support`, a malformed one
//! `bad stub data`, and a reserved opnum nothing at all.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rpcgate_core::{NdrReader, NdrWrite, NdrWriter, RequestHeader, ResponseHeader};
use rpcgate_server::interfaces::cluster::{
    register_cluster_control, UnimplementedClusterControl, CLUSTER_CONTROL_TABLE,
    CLUSTER_SYNTAX_V3_0,
};
use rpcgate_server::telemetry::{init_tracing, LogFormat};
use rpcgate_server::{ConnectionId, OutboundPdu, ServerConfig, ServerConnection};
use serde::Serialize;

const CONTEXT_ID: u16 = 0;

#[derive(Debug, Parser)]
#[command(name = "rpcgate-inspect", version, about = "Route one request stub and report the outcome")]
struct Args {
    /// Operation number of the request.
    #[arg(long, env = "RPCGATE_OPNUM")]
    opnum: u16,

    /// Request stub as hex. Empty for operations without inputs.
    #[arg(long, env = "RPCGATE_STUB", default_value = "")]
    stub: String,

    /// Interface version the presentation context is bound to.
    #[arg(long, env = "RPCGATE_VERSION_MAJOR", default_value_t = 3)]
    version_major: u16,

    #[arg(long, env = "RPCGATE_VERSION_MINOR", default_value_t = 0)]
    version_minor: u16,

    /// Per-call timeout in milliseconds.
    #[arg(long, env = "RPCGATE_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    #[arg(long, env = "RPCGATE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum Outcome {
    Response {
        operation: Option<&'static str>,
        stub: String,
    },
    Fault {
        status: u32,
        name: Option<&'static str>,
    },
    Inert {
        operation: Option<&'static str>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let stub = hex::decode(args.stub.trim()).context("--stub is not valid hex")?;
    let syntax = CLUSTER_SYNTAX_V3_0.with_version(args.version_major, args.version_minor);

    let config = Arc::new(ServerConfig {
        default_call_timeout_ms: args.timeout_ms,
        ..ServerConfig::default()
    });
    let conn = ServerConnection::new(ConnectionId(1), config);
    register_cluster_control(&conn, Arc::new(UnimplementedClusterControl));
    conn.bind_context(CONTEXT_ID, syntax);

    let mut body = NdrWriter::with_capacity(8 + stub.len());
    RequestHeader {
        alloc_hint: u32::try_from(stub.len()).context("stub too large")?,
        context_id: CONTEXT_ID,
        opnum: args.opnum,
        object: None,
    }
    .encode(&mut body);
    body.write_bytes(&stub);

    tracing::info!(opnum = args.opnum, %syntax, stub_len = stub.len(), "routing stub");

    let operation = CLUSTER_CONTROL_TABLE.operation_name(args.opnum);
    let outcome = match conn.handle_request(false, body.freeze()).await {
        OutboundPdu::Response(body) => {
            let mut reader = NdrReader::new(body);
            ResponseHeader::decode(&mut reader).context("malformed response body")?;
            Outcome::Response {
                operation,
                stub: hex::encode(reader.into_remaining()),
            }
        }
        OutboundPdu::Fault { status, .. } => Outcome::Fault {
            status: status.0,
            name: status.name(),
        },
        OutboundPdu::Silent => Outcome::Inert { operation },
    };

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
