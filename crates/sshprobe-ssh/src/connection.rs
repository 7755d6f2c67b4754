//! SSH connection management

use crate::endpoint::HostAddr;
use crate::error::TransportError;
use crate::exec::{run_session, ExecOutput};
use crate::handler::ClientHandler;
use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::ChannelStream;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a tunnelled hop may take to end its session before the bastion is closed
const HOP_CLOSE_GRACE: Duration = Duration::from_secs(2);

const HOP_CLOSE_POLL: Duration = Duration::from_millis(10);

/// An established, authenticated connection owned by one probe invocation
#[async_trait]
pub trait LiveConnection: Send + fmt::Debug {
    /// Address of the endpoint this connection is bound to
    fn address(&self) -> &HostAddr;

    /// Whether the connection is tunnelled through a bastion
    fn is_relayed(&self) -> bool;

    /// Run one command line on a new session channel
    async fn run(
        &mut self,
        command_line: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, TransportError>;

    /// Disconnect; a relayed connection closes the target before the bastion
    async fn close(&mut self);
}

/// SSH connection wrapper
pub struct Connection {
    // Declaration order is drop order: the tunnelled handle must go before
    // the bastion connection that carries it.
    /// Client handle for this hop
    handle: Handle<ClientHandler>,
    /// Address this hop is bound to
    address: HostAddr,
    /// Login name
    user: String,
    /// Bastion connection carrying this one
    relay: Option<Box<Connection>>,
    /// Set once `close` ran
    closed: bool,
}

impl Connection {
    /// Wrap a handle dialled directly
    pub(crate) fn new(handle: Handle<ClientHandler>, address: HostAddr, user: String) -> Self {
        Self {
            handle,
            address,
            user,
            relay: None,
            closed: false,
        }
    }

    /// Wrap a handle established over a tunnel through `relay`
    pub(crate) fn tunnelled(
        handle: Handle<ClientHandler>,
        address: HostAddr,
        user: String,
        relay: Connection,
    ) -> Self {
        Self {
            handle,
            address,
            user,
            relay: Some(Box::new(relay)),
            closed: false,
        }
    }

    /// Login name on this hop
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The bastion connection, if relayed
    pub fn relay(&self) -> Option<&Connection> {
        self.relay.as_deref()
    }

    /// Check if the connection is closed
    pub fn is_closed(&self) -> bool {
        self.closed || self.handle.is_closed()
    }

    /// Open a `direct-tcpip` stream to `target` inside this connection.
    ///
    /// No new socket is created: the stream is a channel multiplexed over
    /// the already authenticated session.
    pub(crate) async fn open_tunnel(
        &self,
        target: &HostAddr,
    ) -> Result<ChannelStream<Msg>, russh::Error> {
        debug!("Opening tunnel through {} to {}", self.address, target);
        let channel = self
            .handle
            .channel_open_direct_tcpip(target.host.clone(), u32::from(target.port), "127.0.0.1", 0)
            .await?;
        Ok(channel.into_stream())
    }

    /// Disconnect this hop, then the bastion behind it
    pub async fn disconnect(&mut self) {
        let mut hop = Some(self);
        while let Some(conn) = hop {
            conn.disconnect_hop().await;
            hop = conn.relay.as_deref_mut();
        }
    }

    async fn disconnect_hop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        debug!("Closing SSH connection to {}", self.address);
        if self.handle.is_closed() {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
        {
            warn!("Failed to disconnect from {}: {}", self.address, e);
            return;
        }

        // The DISCONNECT of a tunnelled hop travels inside the bastion session,
        // so the bastion must stay up until this session has ended.
        if self.relay.is_some() && !self.wait_closed(HOP_CLOSE_GRACE).await {
            warn!(
                "{} still open after {:?}, closing the bastion anyway",
                self.address, HOP_CLOSE_GRACE
            );
        }
    }

    /// Wait until the session task behind the handle has finished
    async fn wait_closed(&self, grace: Duration) -> bool {
        let closed = async {
            while !self.handle.is_closed() {
                tokio::time::sleep(HOP_CLOSE_POLL).await;
            }
        };
        tokio::time::timeout(grace, closed).await.is_ok()
    }
}

#[async_trait]
impl LiveConnection for Connection {
    fn address(&self) -> &HostAddr {
        &self.address
    }

    fn is_relayed(&self) -> bool {
        self.relay.is_some()
    }

    async fn run(
        &mut self,
        command_line: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, TransportError> {
        run_session(&self.handle, command_line, cancel).await
    }

    async fn close(&mut self) {
        self.disconnect().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("relay", &self.relay)
            .field("closed", &self.closed)
            .finish()
    }
}
