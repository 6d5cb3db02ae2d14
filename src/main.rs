//! MCP server for MongoDB.
//!
//! Run with `mongo-mcp --uri mongodb://host:27017 --database app`, with a
//! `config.yaml`, or `mongo-mcp --memory` for an in-process store. Add
//! `--sse` to serve HTTP with server-sent events instead of stdio.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mongo_mcp::{
    serve_sse, Config, DocumentStore, McpServer, McpSession, MemoryStore, MongoStore, Transport,
};

/// MCP server for MongoDB.
///
/// Exposes MongoDB operations as MCP tools for AI agents.
/// Communicates via JSON-RPC 2.0 over stdin/stdout.
#[derive(Parser)]
#[command(name = "mongo-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file. Defaults to ./config.yaml when present.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// MongoDB connection string. Overrides the config file.
    /// Mutually exclusive with --memory.
    #[arg(long, env = "MONGO_MCP_URI", value_name = "URI", conflicts_with = "memory")]
    uri: Option<String>,

    /// Database to operate on. Overrides the config file.
    #[arg(long, env = "MONGO_MCP_DATABASE", value_name = "NAME")]
    database: Option<String>,

    /// Use an in-memory store instead of MongoDB.
    /// Data is not persisted.
    #[arg(long)]
    memory: bool,

    /// Deadline for a single tool call, in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Serve HTTP with server-sent events instead of stdio.
    #[arg(long)]
    sse: bool,

    /// Listen address for --sse, e.g. 0.0.0.0:8080.
    #[arg(long, env = "MONGO_MCP_ADDRESS", value_name = "ADDR")]
    address: Option<String>,

    /// Public URL announced to SSE clients.
    #[arg(long, env = "MONGO_MCP_BASE_URL", value_name = "URL")]
    base_url: Option<String>,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    // stdout carries the protocol; logs go to stderr only.
    let filter = if verbose {
        EnvFilter::new("mongo_mcp=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    // Load configuration
    let mut config = match Config::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(uri) = args.uri {
        config.mongo.uri = Some(uri);
    }
    if let Some(database) = args.database {
        config.mongo.database = database;
    }
    if let Some(timeout) = args.timeout {
        config.server.call_timeout_secs = timeout;
    }
    if args.sse {
        config.server.transport = Transport::Sse;
    }
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if let Some(base_url) = args.base_url {
        config.server.base_url = Some(base_url);
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Open the store
    let store: Arc<dyn DocumentStore> = if args.memory {
        tracing::info!("using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        match connect(&config).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!(
                    "Error: Failed to connect to database '{}': {}",
                    config.mongo.database, e
                );
                std::process::exit(1);
            }
        }
    };

    // Create session and server
    let session = McpSession::new(store)
        .with_counters_collection(config.server.counters_collection.clone())
        .with_call_timeout(config.server.call_timeout());
    let server = McpServer::new(session);

    // Run the server
    let result = match config.server.transport {
        Transport::Stdio => server.run().await,
        Transport::Sse => {
            serve_sse(
                Arc::new(server),
                &config.server.address,
                &config.server.base_url(),
            )
            .await
        }
    };
    if let Err(e) = result {
        eprintln!("Error: Server error: {}", e);
        std::process::exit(1);
    }
}

async fn connect(config: &Config) -> mongo_mcp::Result<MongoStore> {
    let options = config.mongo.client_options(env!("CARGO_PKG_NAME")).await?;
    MongoStore::connect(
        options,
        &config.mongo.database,
        &config.server.counters_collection,
    )
    .await
}
