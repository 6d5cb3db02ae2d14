//! Index tools.
//!
//! Tools: ListIndexes, CreateIndex, DropIndex

use mongodb::bson::Document;
use serde_json::{Map, Value as JsonValue};

use crate::convert::{document_to_json, get_collection_arg, get_document_arg, get_string_arg};
use crate::error::{McpError, Result};
use crate::session::{CallContext, McpSession};
use crate::store::IndexInfo;
use crate::tools::{collection_param, ParamSpec, ToolDef};

/// List the indexes of a collection.
pub const LIST_INDEXES: &str = "ListIndexes";
/// Create an index.
pub const CREATE_INDEX: &str = "CreateIndex";
/// Drop an index by name.
pub const DROP_INDEX: &str = "DropIndex";

/// Get all index tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            LIST_INDEXES,
            "List all indexes of a collection, one per line.",
            vec![collection_param("Collection name")],
        ),
        ToolDef::new(
            CREATE_INDEX,
            "Create an index on a collection. Returns the index name.",
            vec![
                collection_param("Collection name"),
                ParamSpec::object(
                    "index_spec",
                    "Index specification (e.g., { \"field\": 1 } for an ascending index)",
                )
                .required(),
            ],
        ),
        ToolDef::new(
            DROP_INDEX,
            "Drop an index from a collection by name.",
            vec![
                collection_param("Collection name"),
                ParamSpec::string("index_name", "Name of the index to drop").required(),
            ],
        ),
    ]
}

/// Arguments of `ListIndexes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListIndexesRequest {
    /// Collection whose indexes are listed
    pub collection: String,
}

impl ListIndexesRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        Ok(Self {
            collection: get_collection_arg(args)?,
        })
    }
}

/// Arguments of `CreateIndex`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexRequest {
    /// Collection to index
    pub collection: String,
    /// Key specification
    pub index_spec: Document,
}

impl CreateIndexRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        let index_spec = get_document_arg(args, "index_spec")?;
        if index_spec.is_empty() {
            return Err(McpError::invalid_arg("index_spec", "must name at least one field"));
        }
        Ok(Self {
            collection: get_collection_arg(args)?,
            index_spec,
        })
    }
}

/// Arguments of `DropIndex`.
#[derive(Debug, Clone, PartialEq)]
pub struct DropIndexRequest {
    /// Collection owning the index
    pub collection: String,
    /// Index to drop
    pub index_name: String,
}

impl DropIndexRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        let index_name = get_string_arg(args, "index_name")?;
        if index_name.is_empty() {
            return Err(McpError::invalid_arg("index_name", "must not be empty"));
        }
        Ok(Self {
            collection: get_collection_arg(args)?,
            index_name,
        })
    }
}

/// Dispatch an index tool call.
pub async fn dispatch(
    session: &McpSession,
    ctx: &CallContext,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<String> {
    let store = session.store();

    match name {
        LIST_INDEXES => {
            let req = ListIndexesRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, "list indexes");

            let indexes = ctx.run(store.list_indexes(&req.collection)).await?;
            Ok(format_indexes(indexes))
        }

        CREATE_INDEX => {
            let req = CreateIndexRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, spec = %req.index_spec, "create index");

            let index = ctx.run(store.create_index(&req.collection, req.index_spec)).await?;
            Ok(format!("Index created, Name: {}", index))
        }

        DROP_INDEX => {
            let req = DropIndexRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, index = %req.index_name, "drop index");

            ctx.run(store.drop_index(&req.collection, &req.index_name)).await?;
            Ok(format!("Index dropped successfully, name: {}", req.index_name))
        }

        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}

fn format_indexes(indexes: Vec<IndexInfo>) -> String {
    if indexes.is_empty() {
        return "No indexes found".to_string();
    }
    indexes
        .into_iter()
        .map(|i| format!("{}: {}", i.name, document_to_json(i.keys)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde_json::json;

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_create_index_request() {
        let req = CreateIndexRequest::decode(&args(json!({
            "collection": "users",
            "index_spec": {"email": 1, "created": -1}
        })))
        .unwrap();
        assert_eq!(req.index_spec, doc! { "email": 1, "created": -1 });

        let err = CreateIndexRequest::decode(&args(json!({"collection": "users", "index_spec": {}})))
            .unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_drop_index_request_needs_string_name() {
        let err = DropIndexRequest::decode(&args(json!({"collection": "c", "index_name": {"a": 1}})))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidArg { .. }));
    }

    #[test]
    fn test_format_indexes() {
        assert_eq!(format_indexes(vec![]), "No indexes found");
        let listed = format_indexes(vec![
            IndexInfo { name: "_id_".to_string(), keys: doc! { "_id": 1 } },
            IndexInfo { name: "email_1".to_string(), keys: doc! { "email": 1 } },
        ]);
        assert_eq!(listed, "_id_: {\"_id\":1}\nemail_1: {\"email\":1}");
    }
}
