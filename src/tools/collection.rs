//! Collection tools.
//!
//! Tools: ListCollections

use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::session::{CallContext, McpSession};
use crate::tools::ToolDef;

/// List all collections in the database.
pub const LIST_COLLECTIONS: &str = "ListCollections";

/// Get all collection tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![ToolDef::new(
        LIST_COLLECTIONS,
        "List all collections in the MongoDB database.",
        vec![],
    )]
}

/// Dispatch a collection tool call.
pub async fn dispatch(
    session: &McpSession,
    ctx: &CallContext,
    name: &str,
    _args: Map<String, JsonValue>,
) -> Result<String> {
    match name {
        LIST_COLLECTIONS => {
            tracing::debug!("listing collections");
            let names = ctx.run(session.store().list_collection_names()).await?;
            Ok(format_collections(&names))
        }
        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}

fn format_collections(names: &[String]) -> String {
    if names.is_empty() {
        return "No collections found".to_string();
    }
    format!("Collections: {}", names.join(", "))
}
