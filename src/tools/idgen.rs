//! Identifier generation tool.
//!
//! Tools: entity_id_generator

use serde_json::{Map, Value as JsonValue};

use crate::convert::get_string_arg;
use crate::error::{McpError, Result};
use crate::sequence::entity_types;
use crate::session::{CallContext, McpSession};
use crate::tools::{ParamSpec, ToolDef};

/// Generate a sequential identifier for an entity type.
pub const ENTITY_ID_GENERATOR: &str = "entity_id_generator";

/// Get all identifier tool definitions.
pub fn tools() -> Vec<ToolDef> {
    let description = format!(
        "Type of entity to generate an id for, one of: {}",
        entity_types().join(", ")
    );
    vec![ToolDef::new(
        ENTITY_ID_GENERATOR,
        "Generate the next sequential id for an entity type, e.g. TSK-0001. \
         Ids never repeat, even across concurrent callers.",
        vec![ParamSpec::string("entity_type", &description).required()],
    )]
}

/// Arguments of `entity_id_generator`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateIdRequest {
    /// Caller-facing entity type, e.g. `task`
    pub entity_type: String,
}

impl GenerateIdRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        Ok(Self {
            entity_type: get_string_arg(args, "entity_type")?,
        })
    }
}

/// Dispatch an identifier tool call.
pub async fn dispatch(
    session: &McpSession,
    ctx: &CallContext,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<String> {
    match name {
        ENTITY_ID_GENERATOR => {
            let req = GenerateIdRequest::decode(&args)?;
            tracing::debug!(entity_type = %req.entity_type, "generate id");

            // Once issued the increment is never dropped; the store bounds it.
            ctx.run_to_completion(session.sequences().generate(&req.entity_type, ctx.timeout()))
                .await
        }
        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}
