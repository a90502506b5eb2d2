use std::path::Path;
use std::time::Duration;

use filament_core::endpoint::DEFAULT_RPC_PATH;
use filament_core::{Endpoint, EndpointSource, RepoLocator};
use filament_fabric::codec::JsonCodec;
use filament_fabric::Channel;
use tracing::debug;

use crate::client::RpcClient;
use crate::error::Result;

/// Default interval between endpoint lookups and between connection attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for establishing a connection to a peer
///
/// Polling runs at a fixed interval without limit; bound it with an external
/// timeout.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    poll_interval: Duration,
    rpc_path: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval between attempts
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the RPC path requested from the peer
    pub fn rpc_path(mut self, path: impl Into<String>) -> Self {
        self.rpc_path = path.into();
        self
    }

    pub fn interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn path(&self) -> &str {
        &self.rpc_path
    }
}

/// Opens a channel to a resolved endpoint
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> filament_fabric::Result<Channel<JsonCodec>>;
}

/// Connects over WebSocket, passing the token in the query string
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn open(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> filament_fabric::Result<Channel<JsonCodec>> {
        Channel::websocket(endpoint.ws_url(&options.rpc_path), JsonCodec).await
    }
}

/// Poll `source` until the peer has published its endpoint
///
/// Only "not yet available" is retried; lookup errors abort.
pub async fn await_endpoint(
    source: &dyn EndpointSource,
    options: &ConnectOptions,
) -> Result<Endpoint> {
    let mut misses = 0u64;
    loop {
        if let Some(endpoint) = source.resolve()? {
            debug!(misses, maddr = %endpoint.maddr, "endpoint available");
            return Ok(endpoint);
        }
        misses += 1;
        tokio::time::sleep(options.poll_interval).await;
    }
}

/// Retry opening a channel to `endpoint` until one succeeds
pub async fn await_channel(
    endpoint: &Endpoint,
    connector: &dyn Connector,
    options: &ConnectOptions,
) -> Channel<JsonCodec> {
    loop {
        match connector.open(endpoint, options).await {
            Ok(channel) => return channel,
            Err(e) => {
                debug!(host = %endpoint.host, port = endpoint.port, "connect failed, retrying: {}", e);
                tokio::time::sleep(options.poll_interval).await;
            }
        }
    }
}

/// Wait for a peer's endpoint, connect to it and start an [`RpcClient`]
pub async fn await_connection(
    source: &dyn EndpointSource,
    connector: &dyn Connector,
    options: &ConnectOptions,
) -> Result<RpcClient> {
    let endpoint = await_endpoint(source, options).await?;
    let channel = await_channel(&endpoint, connector, options).await;
    Ok(RpcClient::new(channel))
}

/// Connect to the peer publishing its endpoint in `repo`, with defaults
pub async fn connect_repo(repo: impl AsRef<Path>) -> Result<RpcClient> {
    let locator = RepoLocator::new(repo.as_ref());
    await_connection(&locator, &WebSocketConnector, &ConnectOptions::default()).await
}
