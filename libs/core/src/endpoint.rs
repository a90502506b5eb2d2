use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// File inside a peer repo holding the API multiaddr
pub const API_FILE: &str = "api";

/// File inside a peer repo holding the API access token
pub const TOKEN_FILE: &str = "token";

/// Default RPC path served by harnessed peers
pub const DEFAULT_RPC_PATH: &str = "/rpc/v0";

static API_MULTIADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/ip4/([^/]+)/tcp/([^/]+)(/http|$)").expect("multiaddr regex must compile")
});

/// Address and credential a peer published for its RPC API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub token: String,
    pub maddr: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse an endpoint from a published multiaddr and token
    ///
    /// Returns `None` when the multiaddr is not an `/ip4/<host>/tcp/<port>` address.
    pub fn from_parts(maddr: &str, token: &str) -> Option<Self> {
        let maddr = maddr.trim();
        let captures = API_MULTIADDR.captures(maddr)?;
        let host = captures.get(1)?.as_str().to_string();
        let port = captures.get(2)?.as_str().parse().ok()?;

        Some(Self {
            token: token.trim().to_string(),
            maddr: maddr.to_string(),
            host,
            port,
        })
    }

    /// WebSocket URL for the RPC API at `path`, token passed as a query parameter
    pub fn ws_url(&self, path: &str) -> String {
        format!(
            "ws://{}:{}{}?token={}",
            self.host, self.port, path, self.token
        )
    }

    /// `token:maddr` form accepted by peer command line tools
    pub fn api_info(&self) -> String {
        format!("{}:{}", self.token, self.maddr)
    }
}

/// Synchronous lookup of a peer endpoint
///
/// `Ok(None)` means the peer has not published its endpoint yet. Any other
/// failure is reported as an error and is not expected to clear up by waiting.
pub trait EndpointSource: Send + Sync {
    fn resolve(&self) -> Result<Option<Endpoint>>;
}

/// Endpoint source backed by a peer repo directory
#[derive(Debug, Clone)]
pub struct RepoLocator {
    path: PathBuf,
}

impl RepoLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EndpointSource for RepoLocator {
    fn resolve(&self) -> Result<Option<Endpoint>> {
        resolve_endpoint(&self.path)
    }
}

/// Read the endpoint a peer published into `repo`
pub fn resolve_endpoint(repo: impl AsRef<Path>) -> Result<Option<Endpoint>> {
    let repo = repo.as_ref();

    let Some(maddr) = read_artifact(&repo.join(API_FILE))? else {
        return Ok(None);
    };
    let Some(token) = read_artifact(&repo.join(TOKEN_FILE))? else {
        return Ok(None);
    };

    let endpoint = Endpoint::from_parts(&maddr, &token);
    if endpoint.is_none() {
        tracing::debug!(repo = %repo.display(), maddr = %maddr.trim(), "api address not usable yet");
    }
    Ok(endpoint)
}

fn read_artifact(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
