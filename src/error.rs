//! Error types for the MCP server.
//!
//! Maps MongoDB driver errors and caller mistakes to MCP-friendly errors.

use std::time::Duration;

use mongodb::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// MCP server errors.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum McpError {
    /// Error from the underlying document store.
    #[error("storage error: {message}")]
    Storage {
        /// Short classification of the fault
        code: String,
        /// Human-readable error message
        message: String,
    },

    /// The store did not answer before the call deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store accepted an insert but reported no `_id`.
    #[error("insert failed")]
    InsertFailed,

    /// The caller cancelled the invocation.
    #[error("operation cancelled")]
    Cancelled,

    /// Unknown tool requested.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// Invalid argument value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Entity type with no registered id prefix.
    #[error("unknown entity type '{entity_type}', expected one of: {}", expected.join(", "))]
    UnknownEntityType {
        /// The type the caller asked for
        entity_type: String,
        /// Recognized entity types
        expected: Vec<String>,
    },

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl McpError {
    /// Build a storage fault with the given classification.
    pub fn storage(code: &str, message: impl Into<String>) -> Self {
        McpError::Storage {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Build an invalid-argument error.
    pub fn invalid_arg(name: &str, reason: impl Into<String>) -> Self {
        McpError::InvalidArg {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error was raised while decoding caller arguments.
    pub fn is_decode(&self) -> bool {
        matches!(self, McpError::MissingArg(_) | McpError::InvalidArg { .. })
    }
}

impl From<mongodb::error::Error> for McpError {
    fn from(err: mongodb::error::Error) -> Self {
        let code = match err.kind.as_ref() {
            ErrorKind::Authentication { .. } => "AUTHENTICATION",
            ErrorKind::Command(_) => "COMMAND_FAILED",
            ErrorKind::Write(_) => "WRITE_FAILED",
            ErrorKind::ServerSelection { .. } => "SERVER_SELECTION",
            ErrorKind::ConnectionPoolCleared { .. } | ErrorKind::Io(_) => "CONNECTION",
            ErrorKind::InvalidArgument { .. } => "INVALID_INPUT",
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                "SERIALIZATION_ERROR"
            }
            _ => "INTERNAL_ERROR",
        };

        McpError::Storage {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl McpError {
    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::UnknownTool(_) => rpc_codes::METHOD_NOT_FOUND,
            McpError::MissingArg(_)
            | McpError::InvalidArg { .. }
            | McpError::UnknownEntityType { .. } => rpc_codes::INVALID_PARAMS,
            McpError::Protocol(_) => rpc_codes::INVALID_REQUEST,
            McpError::Storage { code, .. } if code == "INVALID_INPUT" => rpc_codes::INVALID_PARAMS,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_entity_type_lists_expected() {
        let err = McpError::UnknownEntityType {
            entity_type: "invoice".to_string(),
            expected: vec!["task".to_string(), "lesson".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "unknown entity type 'invoice', expected one of: task, lesson"
        );
        assert_eq!(err.rpc_code(), rpc_codes::INVALID_PARAMS);
    }

    #[test]
    fn decode_errors_are_classified() {
        assert!(McpError::MissingArg("collection".into()).is_decode());
        assert!(McpError::invalid_arg("limit", "too large").is_decode());
        assert!(!McpError::storage("CONNECTION", "down").is_decode());
        assert!(!McpError::Cancelled.is_decode());
    }
}
