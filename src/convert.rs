//! Conversion utilities between JSON tool arguments and BSON.
//!
//! Tool arguments arrive as an untyped JSON map. These helpers pull typed
//! values out of it, failing with `MissingArg` / `InvalidArg` instead of
//! panicking. Document-valued arguments are read as MongoDB extended JSON.

use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};

/// Look up an argument, treating an explicit `null` as absent.
fn present<'a>(args: &'a Map<String, JsonValue>, name: &str) -> Option<&'a JsonValue> {
    args.get(name).filter(|v| !v.is_null())
}

/// Helper to get a required string argument from JSON arguments.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    match present(args, name) {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(_) => Err(McpError::invalid_arg(name, "expected a string")),
        None => Err(McpError::MissingArg(name.to_string())),
    }
}

/// Helper to get the required, non-empty `collection` argument.
pub fn get_collection_arg(args: &Map<String, JsonValue>) -> Result<String> {
    let collection = get_string_arg(args, "collection")?;
    if collection.trim().is_empty() {
        return Err(McpError::invalid_arg("collection", "must not be empty"));
    }
    Ok(collection)
}

/// Helper to get an optional integer argument.
///
/// Integral floats such as `10.0` are accepted.
pub fn get_optional_i64(args: &Map<String, JsonValue>, name: &str) -> Result<Option<i64>> {
    let Some(value) = present(args, name) else {
        return Ok(None);
    };
    let JsonValue::Number(n) = value else {
        return Err(McpError::invalid_arg(name, "expected an integer"));
    };

    if let Some(i) = n.as_i64() {
        return Ok(Some(i));
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(Some(f as i64))
        }
        _ => Err(McpError::invalid_arg(name, "expected an integer")),
    }
}

/// Helper to get an optional boolean argument.
pub fn get_optional_bool(args: &Map<String, JsonValue>, name: &str) -> Result<Option<bool>> {
    match present(args, name) {
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(McpError::invalid_arg(name, "expected a boolean")),
        None => Ok(None),
    }
}

/// Helper to get a required document argument.
pub fn get_document_arg(args: &Map<String, JsonValue>, name: &str) -> Result<Document> {
    get_optional_document(args, name)?.ok_or_else(|| McpError::MissingArg(name.to_string()))
}

/// Helper to get an optional document argument.
pub fn get_optional_document(
    args: &Map<String, JsonValue>,
    name: &str,
) -> Result<Option<Document>> {
    present(args, name)
        .map(|v| json_to_document(name, v.clone()))
        .transpose()
}

/// Convert a JSON object, or a string holding one, into a BSON document.
pub fn json_to_document(name: &str, value: JsonValue) -> Result<Document> {
    match value {
        JsonValue::Object(_) => match Bson::try_from(value) {
            Ok(Bson::Document(doc)) => Ok(doc),
            Ok(other) => Err(McpError::invalid_arg(
                name,
                format!("expected a document, got {}", other),
            )),
            Err(e) => Err(McpError::invalid_arg(name, e.to_string())),
        },
        JsonValue::String(text) => parse_document_text(name, &text),
        _ => Err(McpError::invalid_arg(name, "expected an object")),
    }
}

/// Parse extended-JSON text into a BSON document.
pub fn parse_document_text(name: &str, text: &str) -> Result<Document> {
    let value: JsonValue = serde_json::from_str(text)
        .map_err(|e| McpError::invalid_arg(name, format!("not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(McpError::invalid_arg(name, "expected a JSON object"));
    }
    json_to_document(name, value)
}

/// Render a document as relaxed extended JSON.
pub fn document_to_json(doc: Document) -> JsonValue {
    Bson::Document(doc).into_relaxed_extjson()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};
    use serde_json::json;

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_string_arg() {
        let a = args(json!({"collection": "users", "n": 3, "empty": "  ", "nil": null}));
        assert_eq!(get_string_arg(&a, "collection").unwrap(), "users");
        assert!(matches!(get_string_arg(&a, "n"), Err(McpError::InvalidArg { .. })));
        assert!(matches!(get_string_arg(&a, "missing"), Err(McpError::MissingArg(_))));
        assert!(matches!(get_string_arg(&a, "nil"), Err(McpError::MissingArg(_))));
        assert!(get_collection_arg(&args(json!({"collection": " "}))).is_err());
    }

    #[test]
    fn test_integer_arg() {
        let a = args(json!({"a": 10, "b": 10.0, "c": 2.5, "d": "10"}));
        assert_eq!(get_optional_i64(&a, "a").unwrap(), Some(10));
        assert_eq!(get_optional_i64(&a, "b").unwrap(), Some(10));
        assert!(get_optional_i64(&a, "c").is_err());
        assert!(get_optional_i64(&a, "d").is_err());
        assert_eq!(get_optional_i64(&a, "missing").unwrap(), None);
    }

    #[test]
    fn test_document_arg_object_and_text() {
        let a = args(json!({
            "filter": {"name": "ada", "age": {"$gt": 3}},
            "text": "{\"name\": \"ada\"}",
            "bad": "{not json",
            "scalar": 5,
        }));
        assert_eq!(
            get_document_arg(&a, "filter").unwrap(),
            doc! { "name": "ada", "age": { "$gt": 3 } }
        );
        assert_eq!(get_document_arg(&a, "text").unwrap(), doc! { "name": "ada" });
        assert!(matches!(get_document_arg(&a, "bad"), Err(McpError::InvalidArg { .. })));
        assert!(matches!(get_document_arg(&a, "scalar"), Err(McpError::InvalidArg { .. })));
        assert!(matches!(get_document_arg(&a, "missing"), Err(McpError::MissingArg(_))));
        assert_eq!(get_optional_document(&a, "missing").unwrap(), None);
    }

    #[test]
    fn test_extended_json_object_id() {
        let oid = ObjectId::new();
        let a = args(json!({"filter": {"_id": {"$oid": oid.to_hex()}}}));
        assert_eq!(get_document_arg(&a, "filter").unwrap(), doc! { "_id": oid });
    }

    #[test]
    fn test_parse_document_text_rejects_non_objects() {
        assert!(parse_document_text("document", "[1, 2]").is_err());
        assert!(parse_document_text("document", "").is_err());
        assert_eq!(parse_document_text("document", "{}").unwrap(), doc! {});
    }
}
