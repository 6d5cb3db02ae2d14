//! MongoDB-backed document store.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Database, IndexModel};

use crate::error::{McpError, Result};
use crate::store::{sequence_value, DocumentStore, FindOptions, IndexInfo, UpdateOutcome};

const DUPLICATE_KEY: i32 = 11000;

/// Attempts at the counter upsert before giving up on duplicate-key races.
const SEQUENCE_ATTEMPTS: usize = 3;

/// A [`DocumentStore`] over one MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect with the given options, ping the deployment and prepare the
    /// counter collection.
    pub async fn connect(options: ClientOptions, database: &str, counters: &str) -> Result<Self> {
        let client = Client::with_options(options)?;
        let db = client.database(database);

        db.run_command(doc! { "ping": 1 }).await?;
        tracing::info!(database, "connected to MongoDB");

        let store = Self { db };
        store.ensure_counter_index(counters).await?;
        Ok(store)
    }

    /// Make `id_type` unique so concurrent first-time upserts cannot create
    /// two counter records for one prefix.
    async fn ensure_counter_index(&self, counters: &str) -> Result<()> {
        let model = IndexModel::builder()
            .keys(doc! { "id_type": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let created = self
            .db
            .collection::<Document>(counters)
            .create_index(model)
            .await?;
        tracing::debug!(collection = counters, index = %created.index_name, "counter index ready");
        Ok(())
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

fn is_duplicate_key(kind: &ErrorKind) -> bool {
    match kind {
        ErrorKind::Command(cmd) => cmd.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.db.list_collection_names().await?)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(collection);
        let mut action = coll.find(filter).limit(options.limit);
        if !options.projection.is_empty() {
            action = action.projection(options.projection);
        }
        // The cursor is closed when dropped, on success, error or cancellation.
        let cursor = action.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, collection: &str, filter: Document, limit: Option<u64>) -> Result<u64> {
        let coll = self.collection(collection);
        let mut action = coll.count_documents(filter);
        if let Some(limit) = limit {
            action = action.limit(limit);
        }
        Ok(action.await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Option<Bson>> {
        let res = self.collection(collection).insert_one(document).await?;
        Ok(match res.inserted_id {
            Bson::Null => None,
            id => Some(id),
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        let res = self.collection(collection).delete_one(filter).await?;
        Ok(res.deleted_count)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let res = self
            .collection(collection)
            .update_one(filter, update)
            .upsert(upsert)
            .await?;
        Ok(UpdateOutcome {
            matched: res.matched_count,
            modified: res.modified_count,
            upserted_id: res.upserted_id,
        })
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        let cursor = self.collection(collection).list_indexes().await?;
        let models: Vec<IndexModel> = cursor.try_collect().await?;
        Ok(models
            .into_iter()
            .map(|model| IndexInfo {
                name: model
                    .options
                    .and_then(|o| o.name)
                    .unwrap_or_default(),
                keys: model.keys,
            })
            .collect())
    }

    async fn create_index(&self, collection: &str, keys: Document) -> Result<String> {
        let model = IndexModel::builder().keys(keys).build();
        let res = self.collection(collection).create_index(model).await?;
        Ok(res.index_name)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        self.collection(collection).drop_index(name).await?;
        Ok(())
    }

    async fn next_sequence(&self, counters: &str, id_type: &str, max_time: Duration) -> Result<i64> {
        let coll = self.collection(counters);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let res = coll
                .find_one_and_update(
                    doc! { "id_type": id_type },
                    doc! { "$inc": { "sequence": 1_i64 } },
                )
                .upsert(true)
                .return_document(ReturnDocument::After)
                .max_time(max_time)
                .await;

            match res {
                Ok(Some(counter)) => return sequence_value(&counter),
                Ok(None) => {
                    return Err(McpError::storage(
                        "INVALID_COUNTER",
                        format!("counter for {} missing after upsert", id_type),
                    ))
                }
                // Another caller created the record first; nothing was applied here.
                Err(err) if is_duplicate_key(&err.kind) && attempt < SEQUENCE_ATTEMPTS => {
                    tracing::debug!(id_type, attempt, "counter upsert raced, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
