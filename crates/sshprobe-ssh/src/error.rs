//! SSH-specific error types

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which hop of a connection an error belongs to.
///
/// A `Bastion` failure means the relay path itself is unusable, a `Server`
/// failure means the target could not be reached or authenticated, possibly
/// through an otherwise healthy relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The intermediate relay host
    Bastion,
    /// The probed target host
    Server,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Bastion => f.write_str("Bastion"),
            Stage::Server => f.write_str("Server"),
        }
    }
}

/// Endpoint has no usable credential
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Neither a password nor a private key was configured
    #[error("password or private key is required")]
    MissingCredential,
}

/// Endpoint host could not be turned into a dialable address
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Host part is empty
    #[error("missing host in [{0}]")]
    EmptyHost(String),

    /// Port part is not a valid TCP port
    #[error("invalid port [{port}] in [{input}]")]
    InvalidPort {
        /// The raw host string
        input: String,
        /// The offending port text
        port: String,
    },

    /// Host string does not split into host and port
    #[error("malformed address [{0}]")]
    Malformed(String),
}

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP connection could not be established
    #[error("{stage}: dial tcp {addr}: {source}")]
    Dial {
        /// Failing hop
        stage: Stage,
        /// Address that was dialled
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// SSH protocol negotiation failed
    #[error("{stage}: ssh handshake with {addr} failed: {source}")]
    Handshake {
        /// Failing hop
        stage: Stage,
        /// Remote address
        addr: String,
        /// Protocol error
        #[source]
        source: russh::Error,
    },

    /// Every offered credential was rejected
    #[error("{stage}: ssh: unable to authenticate as [{user}], no supported methods remain")]
    Auth {
        /// Failing hop
        stage: Stage,
        /// Login name
        user: String,
    },

    /// Private key file could not be loaded or decrypted
    #[error("{stage}: unable to load private key [{}]: {source}", path.display())]
    Key {
        /// Failing hop
        stage: Stage,
        /// Key file path
        path: PathBuf,
        /// Decoding error
        #[source]
        source: russh::keys::Error,
    },

    /// The bastion refused to open a tunnel to the target
    #[error("{stage}: tunnel to {addr} failed: {source}")]
    Tunnel {
        /// Failing hop
        stage: Stage,
        /// Target address requested from the bastion
        addr: String,
        /// Channel error
        #[source]
        source: russh::Error,
    },

    /// Session channel or command request failed
    #[error("{stage}: session failed: {source}")]
    Channel {
        /// Failing hop
        stage: Stage,
        /// Channel error
        #[source]
        source: russh::Error,
    },

    /// Dial plus handshake did not finish in time
    #[error("{stage}: connecting to {addr} timed out after {timeout:?}")]
    Timeout {
        /// Failing hop
        stage: Stage,
        /// Remote address
        addr: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// The caller cancelled the invocation
    #[error("{stage}: cancelled")]
    Cancelled {
        /// Hop that was in flight
        stage: Stage,
    },

    /// Endpoint was never resolved
    #[error("{stage}: {source}")]
    Resolve {
        /// Failing hop
        stage: Stage,
        /// Resolution error
        #[source]
        source: ResolveError,
    },
}

impl TransportError {
    /// The hop this error belongs to
    pub fn stage(&self) -> Stage {
        match self {
            TransportError::Dial { stage, .. }
            | TransportError::Handshake { stage, .. }
            | TransportError::Auth { stage, .. }
            | TransportError::Key { stage, .. }
            | TransportError::Tunnel { stage, .. }
            | TransportError::Channel { stage, .. }
            | TransportError::Timeout { stage, .. }
            | TransportError::Cancelled { stage }
            | TransportError::Resolve { stage, .. } => *stage,
        }
    }

    /// Whether the caller cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled { .. })
    }
}
