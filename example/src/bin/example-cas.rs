use rust_etcd_v2::{
    client::{Client, ClientConfig},
    options::RequestOptions,
};

///
/// This example shows optimistic concurrency with compare-and-swap: several tasks increment a shared counter
/// and retry whenever another task won the race.
///
#[tokio::main]
async fn main() {
    let host = std::env::var("ETCD_HOST").unwrap_or_else(|_| "http://127.0.0.1:2379".to_string());
    let client = Client::new(host, ClientConfig::default().with_json(true)).expect("failed to build client");

    let key = "/example-counter";
    // Create the counter only if nobody did already.
    match client
        .set(key, 0, Some(RequestOptions::new().with_prev_exist(false)))
        .await
    {
        Ok(_) => println!("counter created"),
        Err(e) if e.as_client_error().is_some_and(|e| e.is_node_exist()) => {
            println!("counter already exists")
        }
        Err(e) => panic!("failed to create counter: {e}"),
    }

    let mut handles = vec![];
    for task in 0..4 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut conflicts = 0;
            for _ in 0..10 {
                loop {
                    let current = client
                        .get(key, None)
                        .await
                        .expect("failed to read counter")
                        .expect("counter vanished");
                    let n = current.node.value.as_ref().and_then(|v| v.as_i64()).unwrap_or(0);
                    match client.compare_and_swap(key, n + 1, n, None).await {
                        Ok(_) => break,
                        Err(e) if e.as_client_error().is_some_and(|e| e.is_compare_failed()) => {
                            conflicts += 1;
                        }
                        Err(e) => panic!("increment failed: {e}"),
                    }
                }
            }
            println!("task {task} done after {conflicts} conflicts");
        }));
    }
    for h in handles {
        h.await.expect("task failed");
    }

    let last = client.get(key, None).await.expect("failed to read counter");
    println!("final counter: {:?}", last.map(|r| r.node.value));
}
