//! Tests against a live MongoDB deployment.
//!
//! Ignored by default. Run with
//! `MONGO_MCP_URI=mongodb://localhost:27017 cargo test --test mongo_live -- --ignored`.
//! Each test works in its own scratch database and drops it afterwards.

use std::sync::Arc;
use std::time::Duration;

use mongo_mcp::{DocumentStore, FindOptions, MongoStore};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ClientOptions;
use mongodb::Client;

const COUNTERS: &str = "counters";
const MAX_TIME: Duration = Duration::from_secs(5);

fn live_uri() -> String {
    std::env::var("MONGO_MCP_URI").expect("MONGO_MCP_URI must point at a MongoDB deployment")
}

fn scratch_database() -> String {
    format!("mongo_mcp_test_{}", ObjectId::new().to_hex())
}

async fn live_store(database: &str) -> MongoStore {
    let options = ClientOptions::parse(live_uri()).await.unwrap();
    MongoStore::connect(options, database, COUNTERS).await.unwrap()
}

async fn drop_database(database: &str) {
    let client = Client::with_uri_str(live_uri()).await.unwrap();
    client.database(database).drop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs MONGO_MCP_URI"]
async fn test_live_sequence_has_no_gaps_or_repeats() {
    let database = scratch_database();
    let store = Arc::new(live_store(&database).await);

    for expected in 1..=3 {
        let value = store.next_sequence(COUNTERS, "TSK", MAX_TIME).await.unwrap();
        assert_eq!(value, expected);
    }

    // First use of a prefix from many callers at once exercises the
    // duplicate-key retry.
    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let tsk = store.next_sequence(COUNTERS, "TSK", MAX_TIME).await.unwrap();
            let lsn = store.next_sequence(COUNTERS, "LSN", MAX_TIME).await.unwrap();
            (tsk, lsn)
        }));
    }
    let mut tasks = Vec::new();
    let mut lessons = Vec::new();
    for handle in handles {
        let (tsk, lsn) = handle.await.unwrap();
        tasks.push(tsk);
        lessons.push(lsn);
    }
    tasks.sort_unstable();
    lessons.sort_unstable();
    assert_eq!(tasks, (4..=35).collect::<Vec<i64>>());
    assert_eq!(lessons, (1..=32).collect::<Vec<i64>>());

    // One counter record per prefix, guarded by the unique index.
    assert_eq!(store.count(COUNTERS, doc! {}, None).await.unwrap(), 2);
    let indexes = store.list_indexes(COUNTERS).await.unwrap();
    assert!(indexes.iter().any(|i| i.name == "id_type_1"));

    drop_database(&database).await;
}

#[tokio::test]
#[ignore = "needs MONGO_MCP_URI"]
async fn test_live_find_count_and_writes() {
    let database = scratch_database();
    let store = live_store(&database).await;

    for n in 0..5 {
        let id = store.insert_one("items", doc! { "n": n }).await.unwrap();
        assert!(id.is_some());
    }

    let docs = store
        .find(
            "items",
            doc! {},
            FindOptions {
                limit: 2,
                projection: doc! { "_id": 0 },
            },
        )
        .await
        .unwrap();
    assert_eq!(docs, vec![doc! { "n": 0 }, doc! { "n": 1 }]);

    assert_eq!(store.count("items", doc! { "n": { "$gte": 2 } }, None).await.unwrap(), 3);
    assert_eq!(store.count("items", doc! {}, Some(2)).await.unwrap(), 2);

    let outcome = store
        .update_one("items", doc! { "n": 4 }, doc! { "$set": { "tag": "last" } }, false)
        .await
        .unwrap();
    assert_eq!((outcome.matched, outcome.modified), (1, 1));
    let outcome = store
        .update_one("items", doc! { "n": 99 }, doc! { "$set": { "tag": "x" } }, false)
        .await
        .unwrap();
    assert_eq!(outcome.matched, 0);

    assert_eq!(store.delete_one("items", doc! { "n": 0 }).await.unwrap(), 1);
    assert_eq!(store.delete_one("items", doc! { "n": 0 }).await.unwrap(), 0);

    let name = store.create_index("items", doc! { "n": 1 }).await.unwrap();
    assert_eq!(name, "n_1");
    store.drop_index("items", &name).await.unwrap();
    assert!(store.drop_index("items", &name).await.is_err());

    drop_database(&database).await;
}
