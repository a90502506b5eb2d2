//! Filament Fabric - Message transport and codec layer
//!
//! Provides duplex message transports (WebSocket, in-memory) and codec
//! support (JSON) for talking to harnessed peers.
//!
//! # Example
//!
//! ```no_run
//! use filament_fabric::{Channel, codec::JsonCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping { seq: u32 }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pong { seq: u32 }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut channel = Channel::websocket("ws://127.0.0.1:1234/rpc/v0", JsonCodec).await?;
//! channel.send(&Ping { seq: 1 }).await?;
//! let pong: Pong = channel.receive().await?;
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use error::{Error, Result};
