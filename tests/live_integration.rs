//! Runs against a real API service when `MONGODB_HTTP_URL` and
//! `MONGODB_HTTP_TEST_URI` are set; skipped otherwise.

use std::time::{SystemTime, UNIX_EPOCH};

use mongodb_http::{document, FindOptions, MongoHttpClient};
use serde_json::json;

fn live_target() -> Option<String> {
    std::env::var("MONGODB_HTTP_URL").ok()?;
    std::env::var("MONGODB_HTTP_TEST_URI")
        .ok()
        .filter(|uri| !uri.trim().is_empty())
}

#[tokio::test]
async fn live_document_round_trip() {
    let Some(uri) = live_target() else {
        eprintln!("skipping live test: MONGODB_HTTP_URL / MONGODB_HTTP_TEST_URI not set");
        return;
    };

    let client = MongoHttpClient::from_env().expect("client from env");
    let conn = client.connect(&uri).await.expect("connect");
    client.ping(conn).await.expect("ping");

    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_millis();
    let collection = format!("live_test_{suffix}");
    let coll = client
        .collection(conn, "", &collection)
        .expect("collection handle");

    client
        .insert_many(
            coll,
            vec![
                document([("name", json!("a")), ("score", json!(1))]),
                document([("name", json!("b")), ("score", json!(2))]),
            ],
        )
        .await
        .expect("insert many");

    let top = client
        .find(
            coll,
            Default::default(),
            FindOptions::default().sort(document([("score", -1)])).limit(1),
        )
        .await
        .expect("find");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].get("name"), Some(&json!("b")));

    let deleted = client
        .delete_many(coll, Default::default())
        .await
        .expect("cleanup");
    assert_eq!(deleted.deleted_count, 2);

    client.close_all().await.expect("close");
    assert_eq!(client.stats().failed_operations, 0);
}
