//! Filament RPC - JSON-RPC 2.0 client for harnessed peers
//!
//! One [`RpcClient`] owns one duplex connection and multiplexes any number of
//! concurrent calls and server-push subscriptions over it. Responses are
//! correlated by id, so they may arrive in any order. Every call completes
//! exactly once: with the peer's result or error, or with a local failure if
//! the connection was not writable or closed while the call was outstanding.
//!
//! # Example
//!
//! ```no_run
//! use filament_rpc::{connect_repo, api::NodeApi};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rpc = connect_repo("/tmp/lotus-repo").await?;
//! let version = rpc.call("Filecoin.Version", vec![]).await?;
//!
//! let node = NodeApi::new(rpc.clone());
//! node.chain_notify(|changes| println!("head changed: {}", changes)).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod connect;
pub mod error;
pub mod message;

// Re-exports for convenience
pub use client::{ClientStats, NotificationHandler, RpcClient, Subscription};
pub use connect::{await_connection, connect_repo, ConnectOptions, Connector, WebSocketConnector};
pub use error::{CallError, CallErrorKind, Error, Result};
pub use message::{RemoteError, SubscriptionId};

#[doc(hidden)]
pub use serde_json;
