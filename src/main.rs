//! Binary entry point: loads configuration, connects the graph client,
//! bootstraps schema, then serves the MCP tool surface on stdio or,
//! when `--http <addr>` is passed, on streamable HTTP instead.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use assoc_memory_graph::client::GraphClient;
use assoc_memory_graph::config::Config;
use assoc_memory_graph::mcp;
use assoc_memory_graph::storage::MemoryBackend;

#[derive(Parser, Debug)]
#[command(name = "assoc-memory-graph", version, about = "Persistent associative-memory graph service exposed over MCP")]
struct Args {
    /// Serve over streamable HTTP at this address instead of stdio.
    #[arg(long, value_name = "ADDR")]
    http: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(host = %config.host, port = config.port, database = %config.database, "starting assoc-memory-graph");

    let client = Arc::new(GraphClient::new(MemoryBackend::new()));

    if let Err(e) = client.connect().await {
        error!(error = %e, "failed to connect to graph backend");
        return ExitCode::FAILURE;
    }
    if let Err(e) = client.bootstrap_schema().await {
        error!(error = %e, "schema bootstrap failed");
        return ExitCode::FAILURE;
    }

    let result = match args.http {
        Some(addr) => mcp::serve_http(client, addr).await,
        None => mcp::serve_stdio(client).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mcp server exited with an error");
            ExitCode::FAILURE
        }
    }
}
