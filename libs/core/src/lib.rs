//! Filament Core - shared types for talking to harnessed peers
//!
//! A peer process publishes its API address and access token into its repo
//! directory once it is ready to serve. [`endpoint`] turns those artifacts
//! into an [`Endpoint`] the RPC layer can dial.

pub mod endpoint;
pub mod error;

pub use endpoint::{resolve_endpoint, Endpoint, EndpointSource, RepoLocator};
pub use error::{Error, Result};
