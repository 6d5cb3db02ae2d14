//! Document store abstraction.
//!
//! The tool layer never talks to a driver directly. It is handed an
//! `Arc<dyn DocumentStore>` at construction time, which is either a live
//! MongoDB deployment ([`MongoStore`]) or the in-process [`MemoryStore`].

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::error::Result;

/// Options for a find operation.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Maximum number of documents to return; zero means no limit.
    pub limit: i64,
    /// Projection document; empty means the whole document.
    pub projection: Document,
}

/// Outcome of an update-one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// `_id` of the document created by an upsert, if any.
    pub upserted_id: Option<Bson>,
}

/// An index as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// Index name, e.g. `_id_`.
    pub name: String,
    /// Key specification, e.g. `{ "_id": 1 }`.
    pub keys: Document,
}

/// A shared, concurrency-safe handle on one logical database.
///
/// Every method issues exactly one logical storage operation. Cursors are
/// drained inside the call and released on every exit path, including when
/// the returned future is dropped.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of all collections, in store order.
    async fn list_collection_names(&self) -> Result<Vec<String>>;

    /// Documents matching `filter`, in store order.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>>;

    /// Count documents matching `filter`, optionally capped at `limit`.
    async fn count(&self, collection: &str, filter: Document, limit: Option<u64>) -> Result<u64>;

    /// Insert one document; returns the assigned `_id`, if the store reported one.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<Option<Bson>>;

    /// Delete the first document matching `filter`; returns the deleted count.
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Update the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome>;

    /// Indexes defined on `collection`, in store order.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>>;

    /// Create an index and return its name.
    async fn create_index(&self, collection: &str, keys: Document) -> Result<String>;

    /// Drop the index called `name`.
    async fn drop_index(&self, collection: &str, name: &str) -> Result<()>;

    /// Atomically increment the counter keyed by `id_type`, creating it at 1
    /// when absent, and return the post-increment value.
    ///
    /// Must be a single indivisible storage operation. `max_time` bounds it
    /// on the store side: once issued, it either applies and its value is
    /// returned, or the store aborts it without applying.
    async fn next_sequence(&self, counters: &str, id_type: &str, max_time: Duration)
        -> Result<i64>;
}

/// Read a counter value, accepting either BSON integer width.
pub(crate) fn sequence_value(doc: &Document) -> Result<i64> {
    use crate::error::McpError;

    let seq = match doc.get("sequence") {
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(other) => {
            return Err(McpError::storage(
                "INVALID_COUNTER",
                format!("counter sequence is not an integer: {}", other),
            ))
        }
        None => {
            return Err(McpError::storage(
                "INVALID_COUNTER",
                "counter document has no sequence field",
            ))
        }
    };

    if seq < 1 {
        return Err(McpError::storage(
            "INVALID_COUNTER",
            format!("counter sequence out of range: {}", seq),
        ));
    }
    Ok(seq)
}
