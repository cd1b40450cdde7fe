use std::{sync::mpsc, time::Duration};

use mongodb_http::{document, BlockingClient};

fn main() -> anyhow::Result<()> {
    let uri = std::env::var("MONGODB_URI")?;

    let client = BlockingClient::from_env()?;
    let conn = client.connect(&uri)?;
    let sessions = client.collection(conn, "", "sessions")?;

    let (tx, rx) = mpsc::channel();
    client.insert_one_detached(
        sessions,
        document([("player", "Kit"), ("map", "de_dust2")]),
        move |result| {
            let _ = tx.send(result);
        },
    );

    // The host keeps running its own loop while the insert is in flight.
    match rx.recv_timeout(Duration::from_secs(10))? {
        Ok(inserted) => println!("inserted {}", inserted.inserted_id),
        Err(err) => eprintln!("insert failed ({}): {err}", err.code()),
    }

    client.close_all()?;
    Ok(())
}
