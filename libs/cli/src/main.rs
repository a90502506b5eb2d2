//! Filament CLI - poke a harnessed peer over its JSON-RPC API.
//!
//! Waits for the peer to publish its endpoint in its repo directory, then
//! issues one call or follows one subscription.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use filament_core::{resolve_endpoint, RepoLocator};
use filament_rpc::{await_connection, ConnectOptions, RpcClient, WebSocketConnector};
use serde_json::Value;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "filament")]
#[command(about = "JSON-RPC client for harnessed blockchain peers")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the FULLNODE_API_INFO string a peer published
    Info {
        /// Peer repo directory
        #[arg(long)]
        repo: PathBuf,
    },
    /// Call a method and print its result
    Call(CallArgs),
    /// Subscribe and print every value until the channel closes
    Watch(CallArgs),
}

#[derive(Args, Debug)]
struct CallArgs {
    /// Peer repo directory
    #[arg(long)]
    repo: PathBuf,

    /// Seconds to wait for the peer to come up
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// RPC path on the peer
    #[arg(long, default_value = filament_core::endpoint::DEFAULT_RPC_PATH)]
    rpc_path: String,

    /// Method name, e.g. Filecoin.Version
    method: String,

    /// Params as a JSON array
    #[arg(default_value = "[]")]
    params: String,
}

impl CallArgs {
    fn params(&self) -> Result<Vec<Value>> {
        serde_json::from_str(&self.params).context("params must be a JSON array")
    }

    async fn connect(&self) -> Result<RpcClient> {
        let locator = RepoLocator::new(&self.repo);
        let options = ConnectOptions::new().rpc_path(&self.rpc_path);

        info!("Waiting for peer in {}", self.repo.display());
        let connect = await_connection(&locator, &WebSocketConnector, &options);
        let client = tokio::time::timeout(Duration::from_secs(self.timeout), connect)
            .await
            .with_context(|| format!("peer in {} did not come up", self.repo.display()))??;
        Ok(client)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Command::Info { repo } => {
            let Some(endpoint) = resolve_endpoint(&repo)? else {
                bail!("no endpoint published in {}", repo.display());
            };
            println!("FULLNODE_API_INFO={}", endpoint.api_info());
        }
        Command::Call(args) => {
            let params = args.params()?;
            let client = args.connect().await?;
            let result = client.call(args.method.as_str(), params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Watch(args) => {
            let params = args.params()?;
            let client = args.connect().await?;
            let mut subscription = client
                .subscribe_stream(args.method.as_str(), params)
                .await?;
            info!("Subscribed to {} as {}", args.method, subscription.id());

            loop {
                tokio::select! {
                    value = subscription.recv() => match value {
                        Some(value) => println!("{}", serde_json::to_string(&value)?),
                        None => {
                            info!("Subscription closed");
                            break;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted");
                        client.close().await;
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
