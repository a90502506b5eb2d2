use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use filament_core::{Endpoint, EndpointSource};
use filament_fabric::{codec::JsonCodec, transport::WebSocketListener, Channel};
use filament_rpc::{
    await_connection, connect::await_endpoint, connect_repo, ConnectOptions, Connector, Error,
};
use serde_json::{json, Value};

fn endpoint() -> Endpoint {
    Endpoint::from_parts("/ip4/127.0.0.1/tcp/1234/http", "token").unwrap()
}

/// Reports "not yet available" for the first `misses` lookups
struct DelayedSource {
    misses: u32,
    lookups: AtomicU32,
}

impl DelayedSource {
    fn new(misses: u32) -> Self {
        Self {
            misses,
            lookups: AtomicU32::new(0),
        }
    }

    fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl EndpointSource for DelayedSource {
    fn resolve(&self) -> filament_core::Result<Option<Endpoint>> {
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok((n >= self.misses).then(endpoint))
    }
}

struct BrokenSource;

impl EndpointSource for BrokenSource {
    fn resolve(&self) -> filament_core::Result<Option<Endpoint>> {
        Err(filament_core::Error::custom("permission denied"))
    }
}

/// Refuses the first `failures` attempts, then hands out in-memory channels
struct FlakyConnector {
    failures: u32,
    attempts: AtomicU32,
    peers: Mutex<Vec<Channel<JsonCodec>>>,
}

impl FlakyConnector {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            peers: Mutex::new(Vec::new()),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for FlakyConnector {
    async fn open(
        &self,
        _endpoint: &Endpoint,
        _options: &ConnectOptions,
    ) -> filament_fabric::Result<Channel<JsonCodec>> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(filament_fabric::Error::Custom("connection refused".to_string()));
        }
        let (local, peer) = Channel::memory_pair(JsonCodec);
        self.peers.lock().unwrap().push(peer);
        Ok(local)
    }
}

#[tokio::test(start_paused = true)]
async fn polls_endpoint_at_fixed_interval() {
    let source = DelayedSource::new(3);
    let connector = FlakyConnector::new(0);
    let start = tokio::time::Instant::now();

    let client = await_connection(&source, &connector, &ConnectOptions::default())
        .await
        .unwrap();

    // Three misses, then the lookup that succeeds
    assert_eq!(source.lookups(), 4);
    assert_eq!(connector.attempts(), 1);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(400), "{:?}", elapsed);
    assert!(!client.is_closed());
}

#[tokio::test(start_paused = true)]
async fn retries_connection_attempts() {
    let source = DelayedSource::new(0);
    let connector = FlakyConnector::new(2);
    let start = tokio::time::Instant::now();

    await_connection(&source, &connector, &ConnectOptions::default())
        .await
        .unwrap();

    assert_eq!(source.lookups(), 1);
    assert_eq!(connector.attempts(), 3);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn custom_poll_interval() {
    let source = DelayedSource::new(2);
    let options = ConnectOptions::new().poll_interval(Duration::from_secs(1));
    let start = tokio::time::Instant::now();

    await_endpoint(&source, &options).await.unwrap();

    assert_eq!(source.lookups(), 3);
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn lookup_errors_abort_establishment() {
    let connector = FlakyConnector::new(0);

    match await_connection(&BrokenSource, &connector, &ConnectOptions::default()).await {
        Err(Error::Core(e)) => assert!(e.to_string().contains("permission denied")),
        Err(e) => panic!("Expected lookup error, got {:?}", e),
        Ok(_) => panic!("Expected lookup error"),
    }
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn connects_to_peer_published_in_repo() {
    let repo = tempfile::tempdir().unwrap();
    let listener = WebSocketListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();

    // Peer: answer one call, reporting the URI it was dialed with
    let peer = tokio::spawn(async move {
        let (transport, uri) = listener.accept().await.unwrap();
        let mut channel = Channel::from_transport(transport, JsonCodec);
        let request: Value = channel.receive().await.unwrap();
        channel
            .send(&json!({"jsonrpc": "2.0", "id": request["id"], "result": uri}))
            .await
            .unwrap();
        channel
    });

    // Publish the endpoint a little later, as a starting peer would
    let path = repo.path().to_path_buf();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        std::fs::write(path.join("token"), "secret").unwrap();
        std::fs::write(path.join("api"), format!("/ip4/127.0.0.1/tcp/{}/http", port)).unwrap();
    });

    let client = tokio::time::timeout(Duration::from_secs(10), connect_repo(repo.path()))
        .await
        .unwrap()
        .unwrap();

    let uri = client.call("Filecoin.Version", vec![]).await.unwrap();
    assert_eq!(uri, json!("/rpc/v0?token=secret"));

    let _peer = peer.await.unwrap();
}
