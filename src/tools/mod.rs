//! Tool registry and category definitions.
//!
//! Provides the infrastructure for registering and dispatching MCP tools.

pub mod collection;
pub mod document;
pub mod idgen;
pub mod index;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::result::ToolResult;
use crate::session::{CallContext, McpSession};

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// A string
    String,
    /// Any JSON number
    Number,
    /// A whole number
    Integer,
    /// true / false
    Boolean,
    /// A JSON object (a query or update document)
    Object,
}

/// Description of one tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Expected JSON type
    pub kind: ParamKind,
    /// Human-readable description
    pub description: String,
    /// Whether the caller must supply it
    pub required: bool,
    /// Value used when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Inclusive lower bound for numbers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numbers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ParamSpec {
    fn new(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
            default: None,
            minimum: None,
            maximum: None,
        }
    }

    /// A string parameter.
    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    /// An integer parameter.
    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    /// A boolean parameter.
    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    /// An object (document) parameter.
    pub fn object(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Object, description)
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, value: JsonValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Set inclusive numeric bounds.
    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    fn schema(&self) -> JsonValue {
        let mut prop = Map::new();
        prop.insert("type".to_string(), serde_json::to_value(self.kind).unwrap_or_default());
        prop.insert("description".to_string(), JsonValue::String(self.description.clone()));
        if let Some(default) = &self.default {
            prop.insert("default".to_string(), default.clone());
        }
        if let Some(min) = self.minimum {
            prop.insert("minimum".to_string(), serde_json::json!(min));
        }
        if let Some(max) = self.maximum {
            prop.insert("maximum".to_string(), serde_json::json!(max));
        }
        JsonValue::Object(prop)
    }
}

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "Find")
    pub name: String,
    /// Tool description
    pub description: String,
    /// Parameters, in declaration order
    pub params: Vec<ParamSpec>,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params,
        }
    }

    /// JSON Schema for the input parameters.
    pub fn input_schema(&self) -> JsonValue {
        let mut props = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            props.insert(param.name.clone(), param.schema());
            if param.required {
                required.push(JsonValue::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }
}

/// Registry of all available tools.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    /// Create a new registry with all tools registered.
    pub fn new() -> Self {
        let mut tools = Vec::new();

        // Register all tool categories
        tools.extend(collection::tools());
        tools.extend(document::tools());
        tools.extend(index::tools());
        tools.extend(idgen::tools());

        Self { tools }
    }

    /// Get all tool definitions.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Look up a tool definition by name.
    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Dispatch a tool call to the appropriate handler.
    ///
    /// Returns the success text, or the error the handler produced.
    pub async fn dispatch(
        &self,
        session: &McpSession,
        ctx: &CallContext,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> Result<String> {
        match name {
            collection::LIST_COLLECTIONS => collection::dispatch(session, ctx, name, args).await,
            document::FIND
            | document::COUNT
            | document::INSERT_ONE
            | document::DELETE_ONE
            | document::UPDATE_ONE => document::dispatch(session, ctx, name, args).await,
            index::LIST_INDEXES | index::CREATE_INDEX | index::DROP_INDEX => {
                index::dispatch(session, ctx, name, args).await
            }
            idgen::ENTITY_ID_GENERATOR => idgen::dispatch(session, ctx, name, args).await,
            _ => Err(McpError::UnknownTool(name.to_string())),
        }
    }

    /// Invoke a tool and format its outcome.
    ///
    /// Only an unknown tool name is an `Err`; every failure of a known tool
    /// becomes a failed [`ToolResult`].
    pub async fn call(
        &self,
        session: &McpSession,
        ctx: &CallContext,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> Result<ToolResult> {
        if self.get(name).is_none() {
            return Err(McpError::UnknownTool(name.to_string()));
        }

        let outcome = self.dispatch(session, ctx, name, args).await;
        if let Err(err) = &outcome {
            if err.is_decode() {
                tracing::debug!(tool = name, error = %err, "rejected tool arguments");
            } else {
                tracing::warn!(tool = name, error = %err, "tool call failed");
            }
        }
        Ok(ToolResult::from(outcome))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The `collection` parameter shared by most tools.
pub(crate) fn collection_param(description: &str) -> ParamSpec {
    ParamSpec::string("collection", description).required()
}
