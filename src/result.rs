//! Tool results.

use serde_json::Value as JsonValue;

use crate::error::Result;

/// The single textual outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// Human-readable result text.
    pub text: String,
    /// Whether the invocation failed.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result. Empty outcomes ("No documents found") are successes too.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// A failed result.
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// MCP `tools/call` result payload.
    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "content": [{
                "type": "text",
                "text": self.text,
            }],
            "isError": self.is_error,
        })
    }
}

impl From<Result<String>> for ToolResult {
    fn from(outcome: Result<String>) -> Self {
        match outcome {
            Ok(text) => ToolResult::success(text),
            Err(err) => ToolResult::failure(err.to_string()),
        }
    }
}
