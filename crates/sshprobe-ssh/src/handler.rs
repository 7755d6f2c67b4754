//! russh client handler

use crate::endpoint::HostAddr;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Client-side protocol callbacks for one connection.
///
/// Only server key verification is customised. Without a known_hosts file
/// every key is accepted, which is what a reachability probe wants.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    address: HostAddr,
    known_hosts: Option<PathBuf>,
}

impl ClientHandler {
    /// Create a handler for `address`
    pub fn new(address: HostAddr, known_hosts: Option<PathBuf>) -> Self {
        Self {
            address,
            known_hosts,
        }
    }
}

impl russh::client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let Some(path) = &self.known_hosts else {
            return Ok(true);
        };

        match russh::keys::check_known_hosts_path(
            &self.address.host,
            self.address.port,
            server_public_key,
            path,
        ) {
            Ok(known) => {
                debug!("Host key for {} known: {}", self.address, known);
                Ok(known)
            }
            Err(e) => {
                warn!("Host key check for {} against {} failed: {}", self.address, path.display(), e);
                Ok(false)
            }
        }
    }
}
