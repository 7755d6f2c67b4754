//! Transport abstraction and implementations

use crate::connection::{Connection, LiveConnection};
use crate::endpoint::{AuthConfig, Endpoint, HostAddr};
use crate::error::{Stage, TransportError};
use crate::handler::ClientHandler;
use async_trait::async_trait;
use russh::client::{Config, Handle, Msg};
use russh::keys::PrivateKeyWithHashAlg;
use russh::ChannelStream;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where a probe connects: the target and, optionally, the bastion in front of it
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    /// The probed host
    pub target: &'a Endpoint,
    /// Relay host, dialled first when present
    pub bastion: Option<&'a Endpoint>,
    /// Deadline for each hop's dial plus handshake
    pub timeout: Duration,
}

impl<'a> Route<'a> {
    /// A route straight to `target`
    pub fn direct(target: &'a Endpoint, timeout: Duration) -> Self {
        Self {
            target,
            bastion: None,
            timeout,
        }
    }

    /// A route to `target` tunnelled through `bastion`
    pub fn via(target: &'a Endpoint, bastion: &'a Endpoint, timeout: Duration) -> Self {
        Self {
            target,
            bastion: Some(bastion),
            timeout,
        }
    }
}

/// Opens live connections along a route
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish an authenticated connection to `route.target`
    async fn connect(
        &self,
        route: Route<'_>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn LiveConnection>, TransportError>;
}

/// Streams whose close behaviour can be made abrupt
pub trait Linger {
    /// Drop unsent data on close instead of lingering half-closed
    fn disable_linger(&self) -> io::Result<()>;
}

impl Linger for TcpStream {
    #[allow(deprecated)]
    fn disable_linger(&self) -> io::Result<()> {
        self.set_linger(Some(Duration::ZERO))
    }
}

impl Linger for ChannelStream<Msg> {
    fn disable_linger(&self) -> io::Result<()> {
        // a channel has no socket of its own
        Ok(())
    }
}

/// russh-backed transport
#[derive(Clone)]
pub struct SshTransport {
    config: Arc<Config>,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SshTransport {
    /// Create a transport with the default client configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a transport with a custom russh client configuration
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Dial `endpoint` over TCP and authenticate
    async fn connect_direct(
        &self,
        endpoint: &Endpoint,
        stage: Stage,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Connection, TransportError> {
        let (address, auth) = prepare(endpoint, stage, timeout)?;
        let addr = address.to_string();

        debug!("{}: dialing {} as {}", stage, addr, auth.user);
        let establish = async {
            let stream = TcpStream::connect((address.host.as_str(), address.port))
                .await
                .map_err(|source| TransportError::Dial {
                    stage,
                    addr: addr.clone(),
                    source,
                })?;
            self.handshake(stream, &address, &auth, stage).await
        };

        let handle = bounded(stage, &addr, timeout, cancel, establish).await?;
        Ok(Connection::new(handle, address, auth.user))
    }

    /// Dial the bastion, then reach the target through a tunnel inside it
    async fn connect_relayed(
        &self,
        target: &Endpoint,
        bastion: &Endpoint,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Connection, TransportError> {
        let stage = Stage::Server;
        let (address, auth) = prepare(target, stage, timeout)?;
        let mut relay = self.connect_direct(bastion, Stage::Bastion, timeout, cancel).await?;

        let addr = address.to_string();
        let establish = async {
            let stream = relay
                .open_tunnel(&address)
                .await
                .map_err(|source| TransportError::Tunnel {
                    stage,
                    addr: addr.clone(),
                    source,
                })?;
            if let Err(e) = stream.disable_linger() {
                debug!("Could not disable linger on tunnel to {}: {}", addr, e);
            }
            self.handshake(stream, &address, &auth, stage).await
        };

        let established = bounded(stage, &addr, timeout, cancel, establish).await;
        match established {
            Ok(handle) => Ok(Connection::tunnelled(handle, address, auth.user, relay)),
            Err(e) => {
                relay.disconnect().await;
                Err(e)
            }
        }
    }

    /// SSH handshake and authentication over an already open stream
    async fn handshake<S>(
        &self,
        stream: S,
        address: &HostAddr,
        auth: &AuthConfig,
        stage: Stage,
    ) -> Result<Handle<ClientHandler>, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handler = ClientHandler::new(address.clone(), auth.known_hosts.clone());
        let mut handle = russh::client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|source| TransportError::Handshake {
                stage,
                addr: address.to_string(),
                source,
            })?;

        authenticate(&mut handle, address, auth, stage).await?;
        Ok(handle)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(
        &self,
        route: Route<'_>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn LiveConnection>, TransportError> {
        let connection = match route.bastion {
            Some(bastion) => {
                self.connect_relayed(route.target, bastion, route.timeout, cancel)
                    .await?
            }
            None => {
                self.connect_direct(route.target, Stage::Server, route.timeout, cancel)
                    .await?
            }
        };

        info!(
            "Connected to {}@{}{}",
            connection.user(),
            connection.address(),
            if connection.is_relayed() { " via bastion" } else { "" }
        );
        Ok(Box::new(connection))
    }
}

/// Address and credentials for one hop
fn prepare(
    endpoint: &Endpoint,
    stage: Stage,
    timeout: Duration,
) -> Result<(HostAddr, AuthConfig), TransportError> {
    if let Some(address) = endpoint.address() {
        return Ok((address.clone(), endpoint.auth_config(timeout)));
    }

    // never configured; resolve a copy so the user@ prefix still applies
    let mut endpoint = endpoint.clone();
    let address = endpoint
        .resolve()
        .cloned()
        .map_err(|source| TransportError::Resolve { stage, source })?;
    Ok((address, endpoint.auth_config(timeout)))
}

/// Bound `fut` by `timeout` and abandon it as soon as `cancel` fires
async fn bounded<T>(
    stage: Stage,
    addr: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TransportError::Cancelled { stage }),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(res) => res,
            Err(_) => Err(TransportError::Timeout {
                stage,
                addr: addr.to_string(),
                timeout,
            }),
        },
    }
}

/// Offer the password first, then the private key
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    address: &HostAddr,
    auth: &AuthConfig,
    stage: Stage,
) -> Result<(), TransportError> {
    let protocol = |source: russh::Error| TransportError::Handshake {
        stage,
        addr: address.to_string(),
        source,
    };

    if let Some(password) = &auth.password {
        let result = handle
            .authenticate_password(auth.user.as_str(), password.as_str())
            .await
            .map_err(protocol)?;
        if result.success() {
            return Ok(());
        }
        debug!("{}: password rejected for {}@{}", stage, auth.user, address);
    }

    if let Some(path) = &auth.private_key {
        let key = russh::keys::load_secret_key(path, auth.passphrase.as_deref().map(String::as_str))
            .map_err(|source| TransportError::Key {
                stage,
                path: path.clone(),
                source,
            })?;
        let hash_alg = handle.best_supported_rsa_hash().await.map_err(protocol)?.flatten();
        let result = handle
            .authenticate_publickey(
                auth.user.as_str(),
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map_err(protocol)?;
        if result.success() {
            return Ok(());
        }
        debug!("{}: public key rejected for {}@{}", stage, auth.user, address);
    }

    Err(TransportError::Auth {
        stage,
        user: auth.user.clone(),
    })
}
