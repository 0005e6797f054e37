use rust_etcd_v2::client::{Client, ClientConfig};

///
/// This example prints the cluster membership, the leader and the diagnostic statistics of every member.
///
#[tokio::main]
async fn main() {
    let host = std::env::var("ETCD_HOST").unwrap_or_else(|_| "http://127.0.0.1:2379".to_string());
    let client = Client::new(host, ClientConfig::default()).expect("failed to build client");

    let machines = client.machines().await.expect("failed to list machines");
    println!("machines: {machines:?}");
    println!("leader: {:?}", client.leader().await.expect("failed to get leader"));

    let stats = client.stats();
    for machine in &machines {
        match stats.self_stats(Some(machine)).await {
            Ok(Some(s)) => println!("{machine}: {s}"),
            Ok(None) => println!("{machine}: no stats"),
            Err(e) => println!("{machine}: {e}"),
        }
    }
    println!("store: {:?}", stats.store().await.expect("failed to get store stats"));
    println!("leader stats: {:?}", stats.leader().await.expect("failed to get leader stats"));
}
