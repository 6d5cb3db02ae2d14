//! # mongo-mcp
//!
//! MCP (Model Context Protocol) server for MongoDB.
//!
//! This crate exposes MongoDB collection, document and index operations as
//! tools for AI agents, plus a generator of sequential, never-repeating
//! entity identifiers (`TSK-0001`, `LSN-0042`, ...). It implements the MCP
//! protocol using JSON-RPC 2.0 over stdin/stdout, or over HTTP with
//! server-sent events.
//!
//! ## Features
//!
//! - **10 tools**: ListCollections, Find, Count, InsertOne, DeleteOne,
//!   UpdateOne, ListIndexes, CreateIndex, DropIndex, entity_id_generator
//! - **Caller-safe results**: every call yields exactly one text result;
//!   empty outcomes are successes, storage faults are reported, never raised
//! - **Concurrent calls** with per-call deadlines and MCP cancellation
//! - **Atomic id sequences** backed by a single increment-or-create operation
//!
//! ## Usage
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "mongo": {
//!       "command": "/path/to/mongo-mcp",
//!       "args": ["--uri", "mongodb://localhost:27017", "--database", "app"]
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, you can use the library API with any
//! [`DocumentStore`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use mongo_mcp::{McpServer, McpSession, MemoryStore};
//!
//! # async fn run() -> mongo_mcp::Result<()> {
//! let session = McpSession::new(Arc::new(MemoryStore::new()));
//! let server = McpServer::new(session);
//!
//! // Reads from stdin, writes to stdout
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod convert;
mod error;
mod result;
mod sequence;
mod server;
mod session;
mod sse;
mod store;
mod tools;

pub use config::{Config, MongoConfig, ServerConfig, Transport};
pub use convert::{document_to_json, json_to_document, parse_document_text};
pub use error::{McpError, Result};
pub use result::ToolResult;
pub use sequence::{format_id, prefix_for, SequenceGenerator, ENTITY_PREFIXES};
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer};
pub use session::{CallContext, McpSession};
pub use sse::{serve_sse, sse_router, MESSAGE_PATH, SSE_PATH};
pub use store::{DocumentStore, FindOptions, IndexInfo, MemoryStore, MongoStore, UpdateOutcome};
pub use tools::{ParamKind, ParamSpec, ToolDef, ToolRegistry};
