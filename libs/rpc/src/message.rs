//! JSON-RPC 2.0 envelopes and the channel notification extension
//!
//! Subscriptions ride on two reserved methods sent by the peer:
//! `xrpc.ch.val` with params `[subscription_id, value]` and `xrpc.ch.close`
//! with params `[subscription_id]`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ProtocolError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Peer notification carrying a value for an open subscription
pub const CHANNEL_VALUE_METHOD: &str = "xrpc.ch.val";

/// Peer notification closing a subscription
pub const CHANNEL_CLOSE_METHOD: &str = "xrpc.ch.close";

/// Outbound request envelope
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a [Value]) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Error object returned by the peer
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("error {code}: {message}")]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Peer-assigned subscription identifier, scoped to one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_u64().map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Any message the peer may send, before routing
#[derive(Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// Inbound message, classified by routing target
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    ChannelClose(SubscriptionId),
    ChannelValue(SubscriptionId, Value),
    Response {
        id: u64,
        outcome: Result<Value, RemoteError>,
    },
}

impl RawMessage {
    /// Classify the message by its method discriminator
    ///
    /// A response carrying neither `result` nor `error` succeeds with `null`.
    pub fn classify(self) -> Result<Inbound, ProtocolError> {
        match self.method.as_deref() {
            Some(CHANNEL_CLOSE_METHOD) => {
                let (id, _) = channel_params(CHANNEL_CLOSE_METHOD, self.params)?;
                Ok(Inbound::ChannelClose(id))
            }
            Some(CHANNEL_VALUE_METHOD) => {
                let (id, value) = channel_params(CHANNEL_VALUE_METHOD, self.params)?;
                Ok(Inbound::ChannelValue(id, value))
            }
            Some(other) => Err(ProtocolError::UnexpectedMethod(other.to_string())),
            None => {
                let id = self.id.ok_or(ProtocolError::MissingId)?;
                let outcome = match self.error {
                    Some(error) => Err(error),
                    None => Ok(self.result.unwrap_or(Value::Null)),
                };
                Ok(Inbound::Response { id, outcome })
            }
        }
    }
}

fn channel_params(
    method: &'static str,
    params: Option<Value>,
) -> Result<(SubscriptionId, Value), ProtocolError> {
    let malformed = |params: Value| ProtocolError::MalformedParams { method, params };

    let mut params = match params {
        Some(Value::Array(params)) => params,
        other => return Err(malformed(other.unwrap_or(Value::Null))),
    };
    let Some(id) = params.first().and_then(SubscriptionId::from_value) else {
        return Err(malformed(Value::Array(params)));
    };
    let value = if params.len() > 1 {
        params.swap_remove(1)
    } else {
        Value::Null
    };
    Ok((id, value))
}
