use std::time::{SystemTime, UNIX_EPOCH};

use mongodb_http::{
    document,
    value::{date_millis, parse_date_millis, parse_object_id},
    FindOptions, MongoHttpClient,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let uri = std::env::var("MONGODB_URI")?;

    let client = MongoHttpClient::from_env()?;
    let conn = client.connect(&uri).await?;
    let players = client.collection(conn, "", "players")?;

    let joined = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as i64;
    client
        .insert_one(
            players,
            document([
                ("name", json!("Kit")),
                ("score", json!(42)),
                ("joined", date_millis(joined)),
            ]),
        )
        .await?;

    let top = client
        .find(
            players,
            document([("score", json!({ "$gte": 10 }))]),
            FindOptions::default().sort(document([("score", -1)])).limit(5),
        )
        .await?;

    for player in top {
        let id = player.get("_id").and_then(parse_object_id).unwrap_or("?");
        let joined = player.get("joined").and_then(parse_date_millis);
        println!("{id} {:?} joined={joined:?}", player.get("name"));
    }

    println!("{:?}", client.stats());
    client.close_all().await?;
    Ok(())
}
