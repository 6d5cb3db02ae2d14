//! Document tools.
//!
//! Tools: Find, Count, InsertOne, DeleteOne, UpdateOne

use mongodb::bson::{Bson, Document};
use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{
    document_to_json, get_collection_arg, get_document_arg, get_optional_bool,
    get_optional_document, get_optional_i64,
};
use crate::error::{McpError, Result};
use crate::session::{CallContext, McpSession};
use crate::store::{FindOptions, UpdateOutcome};
use crate::tools::{collection_param, ParamSpec, ToolDef};

/// Query documents.
pub const FIND: &str = "Find";
/// Count documents.
pub const COUNT: &str = "Count";
/// Insert one document.
pub const INSERT_ONE: &str = "InsertOne";
/// Delete one document.
pub const DELETE_ONE: &str = "DeleteOne";
/// Update one document.
pub const UPDATE_ONE: &str = "UpdateOne";

/// Documents returned by `Find` when no limit is given.
pub const DEFAULT_FIND_LIMIT: i64 = 10;
/// Largest `Find` limit accepted.
pub const MAX_FIND_LIMIT: i64 = 1000;

/// Get all document tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            FIND,
            "Query documents in a collection using MongoDB query syntax. \
             Returns one extended-JSON document per line.",
            vec![
                collection_param("Collection name to query"),
                ParamSpec::object("filter", "MongoDB query filter").default_value(json!({})),
                ParamSpec::integer("limit", "Limit the number of documents to return")
                    .default_value(json!(DEFAULT_FIND_LIMIT))
                    .range(1.0, MAX_FIND_LIMIT as f64),
                ParamSpec::object("projection", "MongoDB projection").default_value(json!({})),
            ],
        ),
        ToolDef::new(
            COUNT,
            "Count documents in a collection using MongoDB query syntax.",
            vec![
                collection_param("Collection name to query"),
                ParamSpec::object("filter", "MongoDB query filter").default_value(json!({})),
                ParamSpec::integer("limit", "Stop counting after this many documents")
                    .range(1.0, i64::MAX as f64),
            ],
        ),
        ToolDef::new(
            INSERT_ONE,
            "Insert a single document into a collection. The document is MongoDB \
             extended JSON, e.g. {\"name\": \"ada\", \"born\": {\"$date\": \"1815-12-10T00:00:00Z\"}}.",
            vec![
                collection_param("Collection name to insert into"),
                ParamSpec::string("document", "Document to insert, as extended JSON text")
                    .default_value(json!("{}")),
            ],
        ),
        ToolDef::new(
            DELETE_ONE,
            "Delete the first document in a collection matching the filter.",
            vec![
                collection_param("Collection name to delete from"),
                ParamSpec::object("filter", "Filter to identify the document").required(),
            ],
        ),
        ToolDef::new(
            UPDATE_ONE,
            "Update the first document in a collection matching the filter.",
            vec![
                collection_param("Collection name to update"),
                ParamSpec::object("filter", "Filter to identify the document").required(),
                ParamSpec::object("update", "Update operators to apply, e.g. {\"$set\": {\"a\": 1}}")
                    .required(),
                ParamSpec::boolean("upsert", "Insert a document when nothing matches")
                    .default_value(json!(false)),
            ],
        ),
    ]
}

/// Arguments of `Find`.
#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    /// Collection to query
    pub collection: String,
    /// Query filter
    pub filter: Document,
    /// Maximum documents returned, in `1..=MAX_FIND_LIMIT`
    pub limit: i64,
    /// Projection, empty for whole documents
    pub projection: Document,
}

impl FindRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        let limit = get_optional_i64(args, "limit")?.unwrap_or(DEFAULT_FIND_LIMIT);
        if !(1..=MAX_FIND_LIMIT).contains(&limit) {
            return Err(McpError::invalid_arg(
                "limit",
                format!("must be between 1 and {}", MAX_FIND_LIMIT),
            ));
        }

        Ok(Self {
            collection: get_collection_arg(args)?,
            filter: get_optional_document(args, "filter")?.unwrap_or_default(),
            limit,
            projection: get_optional_document(args, "projection")?.unwrap_or_default(),
        })
    }
}

/// Arguments of `Count`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountRequest {
    /// Collection to count in
    pub collection: String,
    /// Query filter
    pub filter: Document,
    /// Optional cap on the count
    pub limit: Option<u64>,
}

impl CountRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        let limit = match get_optional_i64(args, "limit")? {
            Some(n) if n >= 1 => Some(n.unsigned_abs()),
            Some(_) => return Err(McpError::invalid_arg("limit", "must be at least 1")),
            None => None,
        };

        Ok(Self {
            collection: get_collection_arg(args)?,
            filter: get_optional_document(args, "filter")?.unwrap_or_default(),
            limit,
        })
    }
}

/// Arguments of `InsertOne`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    /// Collection to insert into
    pub collection: String,
    /// Parsed document
    pub document: Document,
}

impl InsertRequest {
    /// Decode and validate tool arguments.
    ///
    /// The document text is parsed here, so malformed text never reaches the store.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        Ok(Self {
            collection: get_collection_arg(args)?,
            document: get_optional_document(args, "document")?.unwrap_or_default(),
        })
    }
}

/// Arguments of `DeleteOne`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    /// Collection to delete from
    pub collection: String,
    /// Filter selecting the document
    pub filter: Document,
}

impl DeleteRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        Ok(Self {
            collection: get_collection_arg(args)?,
            filter: get_document_arg(args, "filter")?,
        })
    }
}

/// Arguments of `UpdateOne`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Collection to update
    pub collection: String,
    /// Filter selecting the document
    pub filter: Document,
    /// Update operators
    pub update: Document,
    /// Insert when nothing matches
    pub upsert: bool,
}

impl UpdateRequest {
    /// Decode and validate tool arguments.
    pub fn decode(args: &Map<String, JsonValue>) -> Result<Self> {
        Ok(Self {
            collection: get_collection_arg(args)?,
            filter: get_document_arg(args, "filter")?,
            update: get_document_arg(args, "update")?,
            upsert: get_optional_bool(args, "upsert")?.unwrap_or(false),
        })
    }
}

/// Dispatch a document tool call.
pub async fn dispatch(
    session: &McpSession,
    ctx: &CallContext,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<String> {
    let store = session.store();

    match name {
        FIND => {
            let req = FindRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, filter = %req.filter, limit = req.limit, "find");

            let options = FindOptions {
                limit: req.limit,
                projection: req.projection,
            };
            let docs = ctx.run(store.find(&req.collection, req.filter, options)).await?;
            Ok(format_documents(docs))
        }

        COUNT => {
            let req = CountRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, filter = %req.filter, "count");

            let count = ctx.run(store.count(&req.collection, req.filter, req.limit)).await?;
            Ok(format!("Count documents success, count: {}", count))
        }

        INSERT_ONE => {
            let req = InsertRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, document = %req.document, "insert one");

            let id = ctx.run(store.insert_one(&req.collection, req.document)).await?;
            format_inserted(id)
        }

        DELETE_ONE => {
            let req = DeleteRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, filter = %req.filter, "delete one");

            let deleted = ctx.run(store.delete_one(&req.collection, req.filter)).await?;
            Ok(format_deleted(deleted))
        }

        UPDATE_ONE => {
            let req = UpdateRequest::decode(&args)?;
            tracing::debug!(collection = %req.collection, filter = %req.filter, update = %req.update, "update one");

            let outcome = ctx
                .run(store.update_one(&req.collection, req.filter, req.update, req.upsert))
                .await?;
            Ok(format_update(&outcome))
        }

        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}

fn format_documents(docs: Vec<Document>) -> String {
    if docs.is_empty() {
        return "No documents found".to_string();
    }
    docs.into_iter()
        .map(|d| document_to_json(d).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_inserted(id: Option<Bson>) -> Result<String> {
    match id {
        Some(id) => Ok(format!("Insert document success, id: {}", id_display(&id))),
        None => Err(McpError::InsertFailed),
    }
}

fn format_deleted(deleted: u64) -> String {
    if deleted == 0 {
        return "No documents deleted".to_string();
    }
    format!("Delete document success, deleted count: {}", deleted)
}

fn format_update(outcome: &UpdateOutcome) -> String {
    let counts = format!(
        "Update document success, matched: {}, modified: {}",
        outcome.matched, outcome.modified
    );
    match &outcome.upserted_id {
        Some(id) => format!("{}, upsertedId: {}", counts, id_display(id)),
        None if outcome.matched == 0 => "No documents matched".to_string(),
        None if outcome.modified == 0 => "No documents updated".to_string(),
        None => counts,
    }
}

/// ObjectIds are shown as bare hex so they can be pasted into an `$oid` filter.
fn id_display(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ToolResult;
    use mongodb::bson::{doc, oid::ObjectId};

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_find_request_defaults() {
        let req = FindRequest::decode(&args(json!({"collection": "users", "extra": true}))).unwrap();
        assert_eq!(req.collection, "users");
        assert_eq!(req.filter, doc! {});
        assert_eq!(req.limit, DEFAULT_FIND_LIMIT);
        assert_eq!(req.projection, doc! {});
    }

    #[test]
    fn test_find_request_limit_bounds() {
        for bad in [json!(0), json!(1001), json!(-5), json!("10")] {
            let err = FindRequest::decode(&args(json!({"collection": "c", "limit": bad}))).unwrap_err();
            assert!(err.is_decode(), "limit {:?} should be rejected", err);
        }
        let req = FindRequest::decode(&args(json!({"collection": "c", "limit": 1000}))).unwrap();
        assert_eq!(req.limit, 1000);
    }

    #[test]
    fn test_count_request_limit() {
        let req = CountRequest::decode(&args(json!({"collection": "c"}))).unwrap();
        assert_eq!(req.limit, None);
        let req = CountRequest::decode(&args(json!({"collection": "c", "limit": 5}))).unwrap();
        assert_eq!(req.limit, Some(5));
        assert!(CountRequest::decode(&args(json!({"collection": "c", "limit": 0}))).is_err());
    }

    #[test]
    fn test_insert_request_parses_text() {
        let req = InsertRequest::decode(&args(json!({
            "collection": "c",
            "document": "{\"a\": 1, \"n\": {\"$numberLong\": \"5\"}}"
        })))
        .unwrap();
        assert_eq!(req.document, doc! { "a": 1, "n": 5_i64 });

        let req = InsertRequest::decode(&args(json!({"collection": "c"}))).unwrap();
        assert_eq!(req.document, doc! {});

        let err = InsertRequest::decode(&args(json!({"collection": "c", "document": "{oops"}))).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_required_documents() {
        assert!(matches!(
            DeleteRequest::decode(&args(json!({"collection": "c"}))),
            Err(McpError::MissingArg(ref n)) if n == "filter"
        ));
        assert!(matches!(
            UpdateRequest::decode(&args(json!({"collection": "c", "filter": {}}))),
            Err(McpError::MissingArg(ref n)) if n == "update"
        ));
        assert!(matches!(
            UpdateRequest::decode(&args(json!({"filter": {}, "update": {}}))),
            Err(McpError::MissingArg(ref n)) if n == "collection"
        ));
    }

    #[test]
    fn test_insert_without_id_is_not_a_storage_fault() {
        let err = format_inserted(None).unwrap_err();
        assert!(matches!(err, McpError::InsertFailed));
        assert_eq!(ToolResult::from(Err::<String, _>(err)).text, "insert failed");

        let oid = ObjectId::new();
        assert_eq!(
            format_inserted(Some(Bson::ObjectId(oid))).unwrap(),
            format!("Insert document success, id: {}", oid.to_hex())
        );
    }

    #[test]
    fn test_format_update_classification() {
        let none_matched = UpdateOutcome::default();
        assert_eq!(format_update(&none_matched), "No documents matched");

        let unchanged = UpdateOutcome { matched: 1, modified: 0, upserted_id: None };
        assert_eq!(format_update(&unchanged), "No documents updated");

        let changed = UpdateOutcome { matched: 1, modified: 1, upserted_id: None };
        assert_eq!(format_update(&changed), "Update document success, matched: 1, modified: 1");

        let oid = ObjectId::new();
        let upserted = UpdateOutcome { matched: 0, modified: 0, upserted_id: Some(Bson::ObjectId(oid)) };
        assert_eq!(
            format_update(&upserted),
            format!("Update document success, matched: 0, modified: 0, upsertedId: {}", oid.to_hex())
        );
    }

    #[test]
    fn test_format_empty_outcomes() {
        assert_eq!(format_documents(vec![]), "No documents found");
        assert_eq!(format_deleted(0), "No documents deleted");
        assert_eq!(format_deleted(1), "Delete document success, deleted count: 1");
        assert_eq!(format_documents(vec![doc! { "a": 1 }, doc! { "b": "x" }]), "{\"a\":1}\n{\"b\":\"x\"}");
    }
}
