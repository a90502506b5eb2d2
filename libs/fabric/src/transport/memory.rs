use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// In-process transport, one end of a connected pair
///
/// Closing or dropping one end ends the other end's receive stream with
/// `Error::ConnectionClosed` once buffered messages are drained.
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create two transports wired to each other
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: a_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(bytes.to_vec()).map_err(|_| Error::ConnectionClosed)
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        self.rx.recv().await.ok_or(Error::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}
