use std::net::SocketAddr;
use volley_core::{RunId, RunSpec};

pub async fn mock() -> SocketAddr {
    mock_service::spawn().await.expect("Mock service failed to start")
}

/// An address nothing is listening on.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn spec(url: &str, num_requests: u64, concurrency: usize) -> RunSpec {
    RunSpec::new(RunId::generate(), url, num_requests, concurrency)
}

pub async fn hits(addr: SocketAddr) -> u64 {
    reqwest::get(format!("http://{addr}/hits"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
        .parse()
        .unwrap()
}
