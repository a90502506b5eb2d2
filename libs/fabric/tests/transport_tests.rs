use filament_fabric::{
    channel::Channel,
    codec::JsonCodec,
    error::Error,
    transport::{MemoryTransport, Transport, WebSocketListener, WebSocketTransport},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestMessage {
    id: u32,
    data: String,
}

/// Helper to get a listener on a free port
async fn get_listener() -> (WebSocketListener, String) {
    let listener = WebSocketListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{}", addr))
}

#[tokio::test]
async fn ws_send_receive_single_message() {
    let (listener, url) = get_listener().await;

    // Spawn server
    tokio::spawn(async move {
        let (mut transport, _uri) = listener.accept().await.unwrap();
        let received = transport.receive().await.unwrap();
        transport.send(&received).await.unwrap(); // Echo back
    });

    // Client
    let mut client = WebSocketTransport::connect(url).await.unwrap();
    let msg = b"hello world";
    client.send(msg).await.unwrap();
    let response = client.receive().await.unwrap();

    assert_eq!(response, msg);
}

#[tokio::test]
async fn ws_multiple_messages_preserve_boundaries() {
    let (listener, url) = get_listener().await;

    tokio::spawn(async move {
        let (mut transport, _uri) = listener.accept().await.unwrap();
        for _ in 0..3 {
            let msg = transport.receive().await.unwrap();
            transport.send(&msg).await.unwrap();
        }
    });

    let mut client = WebSocketTransport::connect(url).await.unwrap();
    let messages = vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()];

    for msg in &messages {
        client.send(msg).await.unwrap();
        let response = client.receive().await.unwrap();
        assert_eq!(&response, msg);
    }
}

#[tokio::test]
async fn ws_non_utf8_payload_survives() {
    let (listener, url) = get_listener().await;

    tokio::spawn(async move {
        let (mut transport, _uri) = listener.accept().await.unwrap();
        let msg = transport.receive().await.unwrap();
        transport.send(&msg).await.unwrap();
    });

    let mut client = WebSocketTransport::connect(url).await.unwrap();
    let payload = vec![0xff, 0x00, 0xfe];
    client.send(&payload).await.unwrap();
    assert_eq!(client.receive().await.unwrap(), payload);
}

#[tokio::test]
async fn ws_listener_reports_request_uri() {
    let (listener, url) = get_listener().await;

    let server = tokio::spawn(async move {
        let (_transport, uri) = listener.accept().await.unwrap();
        uri
    });

    let _client = WebSocketTransport::connect(format!("{}/rpc/v0?token=abc", url))
        .await
        .unwrap();

    assert_eq!(server.await.unwrap(), "/rpc/v0?token=abc");
}

#[tokio::test]
async fn ws_receive_timeout_fires() {
    let (listener, url) = get_listener().await;

    // Spawn server that never responds
    tokio::spawn(async move {
        let (_transport, _uri) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let mut client = WebSocketTransport::builder()
        .url(url)
        .receive_timeout(Duration::from_millis(100))
        .connect()
        .await
        .unwrap();

    client.send(b"hello").await.unwrap();

    let result = client.receive().await;
    assert!(result.is_err());
    match result.unwrap_err() {
        Error::Custom(msg) => assert!(msg.contains("timeout")),
        _ => panic!("Expected timeout error"),
    }
}

#[tokio::test]
async fn ws_connect_refused_is_error() {
    // Bind then drop to get a port nobody listens on
    let (listener, url) = get_listener().await;
    drop(listener);

    let result = WebSocketTransport::connect(url).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn builder_requires_url() {
    match WebSocketTransport::builder().connect().await {
        Err(Error::Custom(msg)) => assert!(msg.contains("URL")),
        Err(e) => panic!("Expected missing URL error, got {:?}", e),
        Ok(_) => panic!("Expected missing URL error"),
    }
}

#[tokio::test]
async fn ws_connection_closed_error() {
    let (listener, url) = get_listener().await;

    // Spawn server that immediately closes
    tokio::spawn(async move {
        let (mut transport, _uri) = listener.accept().await.unwrap();
        transport.close().await.unwrap();
    });

    let mut client = WebSocketTransport::connect(url).await.unwrap();

    let result = client.receive().await;
    match result {
        Err(Error::ConnectionClosed) => {}
        other => panic!("Expected ConnectionClosed, got {:?}", other),
    }
}

#[tokio::test]
async fn channel_with_codec_roundtrip() {
    let (listener, url) = get_listener().await;

    let expected_msg = TestMessage {
        id: 42,
        data: "test data".to_string(),
    };
    let expected_clone = expected_msg.clone();

    tokio::spawn(async move {
        let (transport, _uri) = listener.accept().await.unwrap();
        let mut channel = Channel::from_transport(transport, JsonCodec);

        let msg: TestMessage = channel.receive().await.unwrap();
        channel.send(&msg).await.unwrap(); // Echo back
    });

    let mut channel = Channel::websocket(url, JsonCodec).await.unwrap();

    channel.send(&expected_msg).await.unwrap();
    let response: TestMessage = channel.receive().await.unwrap();

    assert_eq!(response, expected_clone);
}

#[tokio::test]
async fn channel_reports_undecodable_message_as_codec_error() {
    let (mut peer, local) = MemoryTransport::pair();
    let mut channel = Channel::from_transport(local, JsonCodec);

    peer.send(b"not json").await.unwrap();
    peer.send(br#"{"id":7,"data":"ok"}"#).await.unwrap();

    match channel.receive::<TestMessage>().await {
        Err(Error::Codec(_)) => {}
        other => panic!("Expected codec error, got {:?}", other),
    }

    // The channel stays usable after a bad message
    let msg: TestMessage = channel.receive().await.unwrap();
    assert_eq!(msg.id, 7);
}

// Memory Transport Tests

#[tokio::test]
async fn memory_pair_is_duplex() {
    let (mut a, mut b) = MemoryTransport::pair();

    a.send(b"ping").await.unwrap();
    assert_eq!(b.receive().await.unwrap(), b"ping");

    b.send(b"pong").await.unwrap();
    assert_eq!(a.receive().await.unwrap(), b"pong");
}

#[tokio::test]
async fn memory_close_ends_peer_stream_after_drain() {
    let (mut a, mut b) = MemoryTransport::pair();

    a.send(b"last words").await.unwrap();
    a.close().await.unwrap();

    assert_eq!(b.receive().await.unwrap(), b"last words");
    match b.receive().await {
        Err(Error::ConnectionClosed) => {}
        other => panic!("Expected ConnectionClosed, got {:?}", other),
    }

    match a.send(b"too late").await {
        Err(Error::ConnectionClosed) => {}
        other => panic!("Expected ConnectionClosed, got {:?}", other),
    }
}

#[tokio::test]
async fn memory_drop_closes_peer() {
    let (a, mut b) = MemoryTransport::pair();
    drop(a);

    match b.receive().await {
        Err(Error::ConnectionClosed) => {}
        other => panic!("Expected ConnectionClosed, got {:?}", other),
    }
}

#[tokio::test]
async fn memory_channel_pair_roundtrip() {
    let (mut a, mut b) = Channel::memory_pair(JsonCodec);

    let msg = TestMessage {
        id: 1,
        data: "over memory".to_string(),
    };
    a.send(&msg).await.unwrap();
    let received: TestMessage = b.receive().await.unwrap();
    assert_eq!(received, msg);
}
