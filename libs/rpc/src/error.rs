use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::message::RemoteError;

/// Error raised while establishing a connection
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] filament_core::Error),

    #[error(transparent)]
    Transport(#[from] filament_fabric::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a call failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallErrorKind {
    /// The peer answered with an error object
    #[error("{0}")]
    Remote(RemoteError),

    /// The connection was already closed, the request never reached the wire
    #[error("connection not writable")]
    NotWritable,

    /// The connection closed while the call was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer answered, but the result did not have the expected shape
    #[error("unexpected result: {0}")]
    Decode(String),
}

/// A failed call, with enough context to log or retry it
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
    pub kind: CallErrorKind,
}

impl CallError {
    /// The failure as a JSON-RPC error object
    ///
    /// Locally synthesized failures use code `-1`.
    pub fn remote_error(&self) -> RemoteError {
        match &self.kind {
            CallErrorKind::Remote(e) => e.clone(),
            kind => RemoteError {
                code: -1,
                message: kind.to_string(),
                data: None,
            },
        }
    }

    pub fn is_connection_closed(&self) -> bool {
        matches!(self.kind, CallErrorKind::ConnectionClosed)
    }

    pub fn is_not_writable(&self) -> bool {
        matches!(self.kind, CallErrorKind::NotWritable)
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = serde_json::to_string(&self.params).map_err(|_| fmt::Error)?;
        write!(f, "{}{} id={}: {}", self.method, params, self.id, self.kind)
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Inbound message that could not be routed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("response without id")]
    MissingId,

    #[error("malformed {method} params: {params}")]
    MalformedParams { method: &'static str, params: Value },

    #[error("unexpected request for method {0}")]
    UnexpectedMethod(String),
}
