use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::Result;
use crate::transport::{MemoryTransport, Transport, WebSocketTransport};

/// High-level channel for bidirectional communication
///
/// Combines a transport and codec for persistent connections
pub struct Channel<C> {
    transport: Box<dyn Transport>,
    codec: C,
}

impl<C: Codec> Channel<C> {
    /// Create a channel from an existing transport
    pub fn from_transport(transport: impl Transport + 'static, codec: C) -> Self {
        Self {
            transport: Box::new(transport),
            codec,
        }
    }

    /// Open a WebSocket channel
    pub async fn websocket(url: impl Into<String>, codec: C) -> Result<Self> {
        let transport = WebSocketTransport::connect(url).await?;
        Ok(Self::from_transport(transport, codec))
    }

    /// Create two in-process channels wired to each other
    pub fn memory_pair(codec: C) -> (Self, Self)
    where
        C: Clone,
    {
        let (a, b) = MemoryTransport::pair();
        (
            Self::from_transport(a, codec.clone()),
            Self::from_transport(b, codec),
        )
    }

    /// Send a message over the channel
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.transport.send(&bytes).await
    }

    /// Receive a message from the channel
    ///
    /// A message that fails to decode is reported as `Error::Codec` and does
    /// not affect the connection.
    pub async fn receive<T: for<'de> Deserialize<'de>>(&mut self) -> Result<T> {
        let bytes = self.transport.receive().await?;
        self.codec.decode(&bytes)
    }

    /// Close the channel
    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await
    }
}
