use core::time::Duration;

use rust_etcd_v2::{
    client::{Client, ClientConfig},
    options::RequestOptions,
    watcher::{WaitClientExt, WaitEvent},
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DummyValue {
    value: i32,
}

///
/// This example shows how to follow the changes of a key with a typed wait channel while another task writes to it.
///
/// Set `ETCD_HOST` to point at another member, `RUST_LOG=rust_etcd_v2=trace` shows every request issued.
///
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::var("ETCD_HOST").unwrap_or_else(|_| "http://127.0.0.1:2379".to_string());
    let config = ClientConfig::default()
        .with_json(true)
        .with_timeout(Duration::from_secs(5));
    let client = Client::new(host, config).expect("failed to build client");

    let initial = client
        .set("/example-wait", serde_json::json!({ "value": 0 }), None)
        .await
        .expect("failed to write initial value");

    // Start right after the initial write so no update is missed.
    let opts = RequestOptions::new().with_wait_index(initial.node.modified_index + 1);
    let mut rx = client.json_wait_channel::<DummyValue>("/example-wait", Some(opts));

    let writer = client.clone();
    let writer_handle = tokio::spawn(async move {
        for i in 1..=5 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer
                .set("/example-wait", serde_json::json!({ "value": i }), None)
                .await
                .expect("failed to update key");
        }
    });

    let mut seen = 0;
    while let Some(event) = rx.recv().await {
        match event {
            Ok(WaitEvent::Put { value, index, .. }) => {
                println!("{index}: {value:?}");
                seen += 1;
            }
            Ok(WaitEvent::Delete { index, .. }) | Ok(WaitEvent::Expire { index, .. }) => {
                println!("{index}: key removed");
            }
            Err(e) => println!("wait error, still waiting: {e}"),
        }
        if seen == 5 {
            break;
        }
    }

    writer_handle.await.expect("writer failed");
    client
        .delete("/example-wait", None)
        .await
        .expect("failed to clean up");
    println!("Finished!");
}
