//! In-process document store.
//!
//! Implements the subset of MongoDB query and update semantics the tools
//! need: equality and comparison filters, `$and`/`$or`/`$nor`, top-level
//! projections, and the `$set`, `$unset`, `$inc` and `$setOnInsert` update
//! operators. All state lives behind one mutex, so each operation is atomic.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};

use crate::error::{McpError, Result};
use crate::store::{sequence_value, DocumentStore, FindOptions, IndexInfo, UpdateOutcome};

const ID_INDEX: &str = "_id_";

struct MemCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexInfo>,
}

impl MemCollection {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexInfo {
                name: ID_INDEX.to_string(),
                keys: doc! { "_id": 1 },
            }],
        }
    }

    fn insert(&mut self, mut document: Document) -> Result<Bson> {
        let id = match document.remove("_id") {
            Some(id) => id,
            None => Bson::ObjectId(ObjectId::new()),
        };
        if self
            .documents
            .iter()
            .any(|d| d.get("_id").is_some_and(|existing| values_equal(existing, &id)))
        {
            return Err(McpError::storage(
                "DUPLICATE_KEY",
                format!("E11000 duplicate key error, dup key: {{ _id: {} }}", id),
            ));
        }

        let mut stored = doc! { "_id": id.clone() };
        stored.extend(document);
        self.documents.push(stored);
        Ok(id)
    }

    fn position(&self, filter: &Document) -> Result<Option<usize>> {
        for (i, d) in self.documents.iter().enumerate() {
            if matches(d, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

/// A [`DocumentStore`] that keeps every collection in memory.
///
/// Data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, MemCollection>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, MemCollection>>> {
        self.collections
            .lock()
            .map_err(|_| McpError::storage("INTERNAL_ERROR", "memory store lock poisoned"))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let collections = self.lock()?;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        // Zero means no limit, as with the driver.
        let limit = match usize::try_from(options.limit) {
            Ok(0) | Err(_) => usize::MAX,
            Ok(n) => n,
        };
        let mut found = Vec::new();
        for d in &coll.documents {
            if found.len() >= limit {
                break;
            }
            if matches(d, &filter)? {
                found.push(project(d, &options.projection));
            }
        }
        Ok(found)
    }

    async fn count(&self, collection: &str, filter: Document, limit: Option<u64>) -> Result<u64> {
        let collections = self.lock()?;
        let Some(coll) = collections.get(collection) else {
            return Ok(0);
        };

        let mut count = 0u64;
        for d in &coll.documents {
            if matches(d, &filter)? {
                count += 1;
            }
        }
        Ok(match limit {
            Some(cap) if cap > 0 => count.min(cap),
            _ => count,
        })
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Option<Bson>> {
        let mut collections = self.lock()?;
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);
        coll.insert(document).map(Some)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        let mut collections = self.lock()?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };

        match coll.position(&filter)? {
            Some(i) => {
                coll.documents.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        validate_update(&update)?;

        let mut collections = self.lock()?;
        if !upsert && !collections.contains_key(collection) {
            return Ok(UpdateOutcome::default());
        }
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);

        if let Some(i) = coll.position(&filter)? {
            let current = &coll.documents[i];
            let mut updated = current.clone();
            apply_update(&mut updated, &update, false)?;
            if updated.get("_id") != current.get("_id") {
                return Err(McpError::storage(
                    "IMMUTABLE_FIELD",
                    "Performing an update on the path '_id' would modify the immutable field '_id'",
                ));
            }

            let modified = u64::from(updated != *current);
            coll.documents[i] = updated;
            return Ok(UpdateOutcome {
                matched: 1,
                modified,
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateOutcome::default());
        }

        let mut seeded = upsert_seed(&filter)?;
        apply_update(&mut seeded, &update, true)?;
        let id = coll.insert(seeded)?;
        Ok(UpdateOutcome {
            matched: 0,
            modified: 0,
            upserted_id: Some(id),
        })
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, keys: Document) -> Result<String> {
        if keys.is_empty() {
            return Err(McpError::storage("INVALID_INPUT", "index keys cannot be empty"));
        }
        let name = index_name(&keys)?;

        let mut collections = self.lock()?;
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);

        match coll.indexes.iter().find(|i| i.name == name) {
            Some(existing) if existing.keys == keys => {}
            Some(_) => {
                return Err(McpError::storage(
                    "INDEX_CONFLICT",
                    format!("an index named {} already exists with different keys", name),
                ))
            }
            None => coll.indexes.push(IndexInfo {
                name: name.clone(),
                keys,
            }),
        }
        Ok(name)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        let mut collections = self.lock()?;
        let Some(coll) = collections.get_mut(collection) else {
            return Err(McpError::storage(
                "NAMESPACE_NOT_FOUND",
                format!("ns not found: {}", collection),
            ));
        };
        if name == ID_INDEX {
            return Err(McpError::storage("INVALID_INPUT", "cannot drop _id index"));
        }

        let before = coll.indexes.len();
        coll.indexes.retain(|i| i.name != name);
        if coll.indexes.len() == before {
            return Err(McpError::storage(
                "INDEX_NOT_FOUND",
                format!("index not found with name [{}]", name),
            ));
        }
        Ok(())
    }

    async fn next_sequence(&self, counters: &str, id_type: &str, _max_time: Duration) -> Result<i64> {
        let mut collections = self.lock()?;
        let coll = collections
            .entry(counters.to_string())
            .or_insert_with(MemCollection::new);

        let key = Bson::String(id_type.to_string());
        let existing = coll
            .documents
            .iter_mut()
            .find(|d| d.get("id_type") == Some(&key));

        match existing {
            Some(counter) => {
                let next = sequence_value(counter)?.checked_add(1).ok_or_else(|| {
                    McpError::storage("OVERFLOW", format!("counter for {} overflowed", id_type))
                })?;
                counter.insert("sequence", next);
                Ok(next)
            }
            None => {
                coll.insert(doc! { "id_type": id_type, "sequence": 1_i64 })?;
                Ok(1)
            }
        }
    }
}

// Filters

fn unsupported(what: &str) -> McpError {
    McpError::storage("INVALID_INPUT", format!("unknown operator: {}", what))
}

fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, cond)? {
                    all &= matches(doc, clause)?;
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for clause in clauses(key, cond)? {
                    any |= matches(doc, clause)?;
                }
                if key == "$or" {
                    any
                } else {
                    !any
                }
            }
            op if op.starts_with('$') => return Err(unsupported(op)),
            path => field_matches(lookup(doc, path), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, cond: &'a Bson) -> Result<Vec<&'a Document>> {
    let invalid = || McpError::storage("INVALID_INPUT", format!("{} must be an array of documents", op));
    let Bson::Array(items) = cond else {
        return Err(invalid());
    };
    items
        .iter()
        .map(|item| item.as_document().ok_or_else(invalid))
        .collect()
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

fn field_matches(value: Option<&Bson>, cond: &Bson) -> Result<bool> {
    match cond {
        Bson::Document(ops) if is_operator_doc(ops) => {
            for (op, arg) in ops {
                if !operator_matches(value, op, arg)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, cond)),
    }
}

fn operator_matches(value: Option<&Bson>, op: &str, arg: &Bson) -> Result<bool> {
    let ordered = |want: fn(Ordering) -> bool| {
        value
            .and_then(|v| compare(v, arg))
            .is_some_and(want)
    };

    Ok(match op {
        "$eq" => equals(value, arg),
        "$ne" => !equals(value, arg),
        "$gt" => ordered(|o| o == Ordering::Greater),
        "$gte" => ordered(|o| o != Ordering::Less),
        "$lt" => ordered(|o| o == Ordering::Less),
        "$lte" => ordered(|o| o != Ordering::Greater),
        "$in" | "$nin" => {
            let Bson::Array(candidates) = arg else {
                return Err(McpError::storage("INVALID_INPUT", format!("{} needs an array", op)));
            };
            let found = candidates.iter().any(|c| equals(value, c));
            if op == "$in" {
                found
            } else {
                !found
            }
        }
        "$exists" => truthy(arg) == value.is_some(),
        other => return Err(unsupported(other)),
    })
}

fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(v) => values_equal(v, target),
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Some(x.timestamp_millis().cmp(&y.timestamp_millis()))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).map_or(true, |n| n != 0.0),
    }
}

fn project(doc: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }

    let include_id = projection.get("_id").map_or(true, truthy);
    let inclusive = projection
        .iter()
        .any(|(k, v)| k != "_id" && truthy(v));

    doc.iter()
        .filter(|(k, _)| {
            if k.as_str() == "_id" {
                include_id
            } else if inclusive {
                projection.get(k.as_str()).is_some_and(truthy)
            } else {
                projection.get(k.as_str()).map_or(true, truthy)
            }
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// Updates

fn validate_update(update: &Document) -> Result<()> {
    if update.is_empty() || update.keys().any(|k| !k.starts_with('$')) {
        return Err(McpError::storage(
            "INVALID_INPUT",
            "update document requires atomic operators",
        ));
    }
    Ok(())
}

fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> Result<()> {
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(McpError::storage(
                "INVALID_INPUT",
                format!("modifier {} expects a document", op),
            ));
        };

        match op.as_str() {
            "$set" => {
                for (k, v) in fields {
                    set_path(doc, k, v.clone())?;
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (k, v) in fields {
                        set_path(doc, k, v.clone())?;
                    }
                }
            }
            "$unset" => {
                for k in fields.keys() {
                    unset_path(doc, k);
                }
            }
            "$inc" => {
                for (k, by) in fields {
                    let next = increment(lookup(doc, k), by, k)?;
                    set_path(doc, k, next)?;
                }
            }
            other => return Err(unsupported(other)),
        }
    }
    Ok(())
}

/// Write `value` at a dotted path, creating missing embedded documents.
fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<()> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    if head.is_empty() {
        return Err(McpError::storage(
            "INVALID_INPUT",
            format!("empty field name in path '{}'", path),
        ));
    }

    let Some(rest) = rest else {
        doc.insert(head, value);
        return Ok(());
    };
    if !doc.contains_key(head) {
        doc.insert(head, Document::new());
    }
    match doc.get_mut(head) {
        Some(Bson::Document(inner)) => set_path(inner, rest, value),
        Some(other) => Err(McpError::storage(
            "PATH_NOT_VIABLE",
            format!("Cannot create field '{}' in element {{{}: {}}}", rest, head, other),
        )),
        None => Ok(()),
    }
}

/// Remove the field at a dotted path; missing paths are a no-op.
fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn increment(current: Option<&Bson>, by: &Bson, field: &str) -> Result<Bson> {
    if as_f64(by).is_none() {
        return Err(McpError::storage(
            "INVALID_INPUT",
            format!("cannot increment {} with non-numeric argument", field),
        ));
    }
    let Some(current) = current else {
        return Ok(by.clone());
    };

    match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)))),
        _ => match (as_i64(current), as_i64(by)) {
            (Some(a), Some(b)) => a.checked_add(b).map(Bson::Int64).ok_or_else(|| {
                McpError::storage("OVERFLOW", format!("$inc on {} overflowed int64", field))
            }),
            _ => match (as_f64(current), as_f64(by)) {
                (Some(a), Some(b)) => Ok(Bson::Double(a + b)),
                _ => Err(McpError::storage(
                    "INVALID_INPUT",
                    format!("cannot apply $inc to non-numeric field {}", field),
                )),
            },
        },
    }
}

/// Equality clauses of a filter become the fields of an upserted document.
fn upsert_seed(filter: &Document) -> Result<Document> {
    let mut seed = Document::new();
    for (k, v) in filter {
        if k.starts_with('$') || matches!(v, Bson::Document(d) if is_operator_doc(d)) {
            continue;
        }
        set_path(&mut seed, k, v.clone())?;
    }
    Ok(seed)
}

// Indexes

fn index_name(keys: &Document) -> Result<String> {
    let mut parts = Vec::with_capacity(keys.len());
    for (field, direction) in keys {
        let direction = match direction {
            Bson::Int32(v) => v.to_string(),
            Bson::Int64(v) => v.to_string(),
            Bson::Double(v) if v.fract() == 0.0 => format!("{}", *v as i64),
            Bson::String(kind) => kind.clone(),
            other => {
                return Err(McpError::storage(
                    "INVALID_INPUT",
                    format!("bad index key pattern for {}: {}", field, other),
                ))
            }
        };
        parts.push(format!("{}_{}", field, direction));
    }
    Ok(parts.join("_"))
}
