//! Capability traits for the anonymity network.
//!
//! The session only needs three things from the network: start a client,
//! publish an onion service pointing at a local listener, and shut both down
//! again. Keeping these behind traits lets the session be driven by fakes.

use std::path::Path;

use async_trait::async_trait;
use tokio::net::TcpListener;

use crate::error::Result;

/// Options for publishing an onion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Port the onion service advertises to clients.
    pub remote_port: u16,
    /// Request the newest onion service version (v3) rather than the client's default.
    pub use_latest_protocol_version: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            remote_port: 80,
            use_latest_protocol_version: true,
        }
    }
}

/// A published onion service as seen by the session (read-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedService {
    /// Service ID without the ".onion" suffix.
    pub address: String,
    /// Local port the onion service forwards to.
    pub bound_port: u16,
}

impl PublishedService {
    /// The address viewers paste into Tor Browser.
    pub fn url(&self) -> String {
        format!("{}.onion", self.address)
    }
}

/// Entry point: starts a network client with its state under `data_dir`.
#[async_trait]
pub trait AnonymityNetwork: Send + Sync {
    type Client: NetworkClient;

    async fn start(&self, data_dir: &Path) -> Result<Self::Client>;
}

/// A running network client.
#[async_trait]
pub trait NetworkClient: Send {
    type Service: HiddenService;

    /// Publish an onion service. May stall; callers bound it with a deadline.
    async fn publish(&mut self, options: PublishOptions) -> Result<Self::Service>;

    /// Stop the client. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// A published onion service and the local listener it forwards to.
#[async_trait]
pub trait HiddenService: Send {
    fn published(&self) -> &PublishedService;

    /// Hand the local listener to the HTTP server. Returns `None` once taken.
    fn take_listener(&mut self) -> Option<TcpListener>;

    /// Withdraw the service. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}
