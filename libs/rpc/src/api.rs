//! Typed remote method table
//!
//! Each remote method is a struct implementing [`Method`]; its fields are the
//! positional params in declaration order. Use [`methods!`](crate::methods)
//! to declare a table.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::RpcClient;
use crate::error::CallError;
use crate::message::SubscriptionId;

/// A remote method with a statically known call shape
pub trait Method {
    /// Wire name of the method
    const NAME: &'static str;

    /// Result type the peer answers with
    type Output: DeserializeOwned;

    /// Positional params, in wire order
    fn into_params(self) -> Vec<Value>;
}

/// Declare remote methods as [`Method`] structs
///
/// ```
/// use filament_rpc::{methods, api::Method};
/// use serde_json::json;
///
/// methods! {
///     /// Echo a greeting
///     Greet(name: String, loud: bool) -> String = "Demo.Greet";
///     Ping() -> () = "Demo.Ping";
/// }
///
/// let greet = Greet { name: "bob".into(), loud: true };
/// assert_eq!(Greet::NAME, "Demo.Greet");
/// assert_eq!(greet.into_params(), vec![json!("bob"), json!(true)]);
/// assert!(Ping {}.into_params().is_empty());
/// ```
#[macro_export]
macro_rules! methods {
    ($(
        $(#[$meta:meta])*
        $name:ident($($field:ident: $ty:ty),* $(,)?) -> $output:ty = $wire:literal;
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl $crate::api::Method for $name {
            const NAME: &'static str = $wire;
            type Output = $output;

            fn into_params(self) -> ::std::vec::Vec<$crate::serde_json::Value> {
                ::std::vec![$($crate::serde_json::Value::from(self.$field)),*]
            }
        }
    )*};
}

/// Filecoin node and miner APIs as served by harnessed peers
///
/// Payloads are left as JSON; the harness forwards them without interpreting
/// chain semantics.
pub mod filecoin {
    use serde_json::Value;

    use crate::message::SubscriptionId;

    crate::methods! {
        Version() -> Value = "Filecoin.Version";
        ChainHead() -> Value = "Filecoin.ChainHead";
        ChainGetTipSet(tsk: Value) -> Value = "Filecoin.ChainGetTipSet";
        ChainGetMessagesInTipset(tsk: Value) -> Option<Vec<Value>> = "Filecoin.ChainGetMessagesInTipset";
        /// Subscription yielding batches of head changes
        ChainNotify() -> SubscriptionId = "Filecoin.ChainNotify";
        ClientImport(file_ref: Value) -> Value = "Filecoin.ClientImport";
        ClientListDeals() -> Vec<Value> = "Filecoin.ClientListDeals";
        ClientStartDeal(params: Value) -> Value = "Filecoin.ClientStartDeal";
        NetConnect(addr_info: Value) -> () = "Filecoin.NetConnect";
        NetAddrsListen() -> Value = "Filecoin.NetAddrsListen";
        StateMinerInfo(actor: String, tsk: Value) -> Value = "Filecoin.StateMinerInfo";
        WalletImport(key_info: Value) -> String = "Filecoin.WalletImport";
        MarketListIncompleteDeals() -> Vec<Value> = "Filecoin.MarketListIncompleteDeals";
        PledgeSector() -> Value = "Filecoin.PledgeSector";
        SectorsList() -> Vec<u64> = "Filecoin.SectorsList";
        SectorMarkForUpgrade(sector: u64, snap: bool) -> Value = "Filecoin.SectorMarkForUpgrade";
        SectorsStatus(sector: u64, show_on_chain_info: bool) -> Value = "Filecoin.SectorsStatus";
    }
}

/// Node API over an [`RpcClient`]
#[derive(Clone)]
pub struct NodeApi {
    rpc: RpcClient,
}

impl NodeApi {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub async fn version(&self) -> Result<Value, CallError> {
        self.rpc.request(filecoin::Version {}).await
    }

    pub async fn chain_head(&self) -> Result<Value, CallError> {
        self.rpc.request(filecoin::ChainHead {}).await
    }

    pub async fn chain_get_tip_set(&self, tsk: Value) -> Result<Value, CallError> {
        self.rpc.request(filecoin::ChainGetTipSet { tsk }).await
    }

    pub async fn chain_get_messages_in_tipset(
        &self,
        tsk: Value,
    ) -> Result<Option<Vec<Value>>, CallError> {
        self.rpc
            .request(filecoin::ChainGetMessagesInTipset { tsk })
            .await
    }

    /// Watch head changes, `handler` gets each batch as sent by the peer
    pub async fn chain_notify<F>(&self, handler: F) -> Result<SubscriptionId, CallError>
    where
        F: FnMut(Value) + Send + 'static,
    {
        self.rpc.subscribe_to(filecoin::ChainNotify {}, handler).await
    }

    pub async fn client_import(&self, file_ref: Value) -> Result<Value, CallError> {
        self.rpc.request(filecoin::ClientImport { file_ref }).await
    }

    pub async fn client_list_deals(&self) -> Result<Vec<Value>, CallError> {
        self.rpc.request(filecoin::ClientListDeals {}).await
    }

    pub async fn client_start_deal(&self, params: Value) -> Result<Value, CallError> {
        self.rpc.request(filecoin::ClientStartDeal { params }).await
    }

    pub async fn net_connect(&self, addr_info: Value) -> Result<(), CallError> {
        self.rpc.request(filecoin::NetConnect { addr_info }).await
    }

    pub async fn net_addrs_listen(&self) -> Result<Value, CallError> {
        self.rpc.request(filecoin::NetAddrsListen {}).await
    }

    pub async fn state_miner_info(&self, actor: String, tsk: Value) -> Result<Value, CallError> {
        self.rpc
            .request(filecoin::StateMinerInfo { actor, tsk })
            .await
    }

    pub async fn wallet_import(&self, key_info: Value) -> Result<String, CallError> {
        self.rpc.request(filecoin::WalletImport { key_info }).await
    }
}

/// Miner API over an [`RpcClient`]
#[derive(Clone)]
pub struct MinerApi {
    rpc: RpcClient,
}

impl MinerApi {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub async fn version(&self) -> Result<Value, CallError> {
        self.rpc.request(filecoin::Version {}).await
    }

    pub async fn net_addrs_listen(&self) -> Result<Value, CallError> {
        self.rpc.request(filecoin::NetAddrsListen {}).await
    }

    pub async fn market_list_incomplete_deals(&self) -> Result<Vec<Value>, CallError> {
        self.rpc.request(filecoin::MarketListIncompleteDeals {}).await
    }

    pub async fn pledge_sector(&self) -> Result<Value, CallError> {
        self.rpc.request(filecoin::PledgeSector {}).await
    }

    pub async fn sectors_list(&self) -> Result<Vec<u64>, CallError> {
        self.rpc.request(filecoin::SectorsList {}).await
    }

    pub async fn sector_mark_for_upgrade(&self, sector: u64, snap: bool) -> Result<Value, CallError> {
        self.rpc
            .request(filecoin::SectorMarkForUpgrade { sector, snap })
            .await
    }

    pub async fn sectors_status(
        &self,
        sector: u64,
        show_on_chain_info: bool,
    ) -> Result<Value, CallError> {
        self.rpc
            .request(filecoin::SectorsStatus {
                sector,
                show_on_chain_info,
            })
            .await
    }
}
