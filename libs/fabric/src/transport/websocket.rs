use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// WebSocket transport dialed by a client
pub type ClientWebSocketTransport = WebSocketTransport<MaybeTlsStream<TcpStream>>;

/// WebSocket transport accepted by a [`WebSocketListener`]
pub type ServerWebSocketTransport = WebSocketTransport<TcpStream>;

/// WebSocket transport carrying one message per frame
///
/// Outbound messages are sent as text frames when they are valid UTF-8 and as
/// binary frames otherwise. Control frames are handled by tungstenite and
/// never surface from `receive`.
pub struct WebSocketTransport<S> {
    stream: WebSocketStream<S>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
    /// Connect to a `ws://` URL with no timeouts
    pub async fn connect(url: impl Into<String>) -> Result<Self> {
        Self::builder().url(url).connect().await
    }

    /// Connect with a connect timeout
    pub async fn connect_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::builder()
            .url(url)
            .connect_timeout(timeout)
            .connect()
            .await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> WebSocketTransportBuilder {
        WebSocketTransportBuilder::new()
    }
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    /// Wrap an already negotiated WebSocket stream
    pub fn from_stream(stream: WebSocketStream<S>) -> Self {
        Self {
            stream,
            send_timeout: None,
            receive_timeout: None,
        }
    }

    async fn next_message(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "peer closed websocket");
                    return Err(Error::ConnectionClosed);
                }
                // ping, pong and raw frames
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Err(Error::ConnectionClosed)
                }
                Some(Err(WsError::Io(e))) if is_disconnect(&e) => {
                    return Err(Error::ConnectionClosed)
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        UnexpectedEof | ConnectionReset | ConnectionAborted | BrokenPipe
    )
}

fn map_send_error(e: WsError) -> Error {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionClosed,
        WsError::Io(io) if is_disconnect(&io) => Error::ConnectionClosed,
        e => e.into(),
    }
}

#[async_trait::async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let message = match std::str::from_utf8(bytes) {
            Ok(text) => Message::Text(text.to_string()),
            Err(_) => Message::Binary(bytes.to_vec()),
        };
        let send_op = self.stream.send(message);

        if let Some(timeout) = self.send_timeout {
            tokio::time::timeout(timeout, send_op)
                .await
                .map_err(|_| Error::Custom("Send timeout exceeded".to_string()))?
                .map_err(map_send_error)
        } else {
            send_op.await.map_err(map_send_error)
        }
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        if let Some(timeout) = self.receive_timeout {
            tokio::time::timeout(timeout, self.next_message())
                .await
                .map_err(|_| Error::Custom("Receive timeout exceeded".to_string()))?
        } else {
            self.next_message().await
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_send_error(e)),
        }
    }
}

/// WebSocket listener for accepting incoming connections
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept an incoming connection and complete the WebSocket handshake
    ///
    /// Returns the transport together with the request URI the client dialed
    /// (path and query), which is where clients pass their access token.
    pub async fn accept(&self) -> Result<(ServerWebSocketTransport, String)> {
        let (stream, addr) = self.listener.accept().await?;

        let mut uri = String::new();
        let callback = |request: &Request, response: Response| {
            uri = request.uri().to_string();
            Ok::<_, ErrorResponse>(response)
        };
        let stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
        tracing::debug!(%addr, %uri, "accepted websocket");

        Ok((WebSocketTransport::from_stream(stream), uri))
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

/// Builder for configuring a client WebSocket transport
#[derive(Default)]
pub struct WebSocketTransportBuilder {
    url: Option<String>,
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl WebSocketTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL to connect to
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the connection timeout, covering TCP connect and the handshake
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the receive timeout
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Connect with the configured settings
    pub async fn connect(self) -> Result<ClientWebSocketTransport> {
        let url = self
            .url
            .ok_or_else(|| Error::Custom("URL not set".to_string()))?;

        let connect_op = tokio_tungstenite::connect_async(url.as_str());

        let (stream, _response) = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::Custom("Connect timeout exceeded".to_string()))??
        } else {
            connect_op.await?
        };

        Ok(WebSocketTransport {
            stream,
            send_timeout: self.send_timeout,
            receive_timeout: self.receive_timeout,
        })
    }
}
